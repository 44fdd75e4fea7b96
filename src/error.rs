//! 全局错误类型定义

use rmp_serde::{decode::Error as MsgPackDecodeError, encode::Error as MsgPackEncodeError};
use serde_json::Error as SerdeJsonError;
use serde_yaml::Error as SerdeYamlError;
use std::{io::Error as IoError, time::SystemTimeError};
use thiserror::Error;
use url::ParseError as UrlParseError;

#[derive(Error, Debug)]
pub enum RuleMergeError {
    // 规则相关错误
    #[error("规则加载失败：{0}")]
    RuleLoadError(String),
    #[error("规则解析失败：{0}")]
    RuleParseError(String),
    #[error("规则缓存失败：{0}")]
    RuleCacheError(String),
    #[error("不支持的规则文件格式：{0}")]
    UnsupportedFormat(String),

    // 网络相关错误
    #[error("网络请求失败：{0}")]
    HttpError(#[from] reqwest::Error),
    #[error("URL {url} 返回状态码 {status}")]
    HttpStatus { url: String, status: u16 },

    // 序列化/反序列化错误
    #[error("JSON解析失败：{0}")]
    JsonError(#[from] SerdeJsonError),
    #[error("YAML解析失败：{0}")]
    YamlError(#[from] SerdeYamlError),
    #[error("MessagePack反序列化失败：{0}")]
    MsgPackDecode(#[from] MsgPackDecodeError),
    #[error("MessagePack序列化失败：{0}")]
    MsgPackEncode(#[from] MsgPackEncodeError),

    // 发布相关错误
    #[error("git 发布失败：{0}")]
    PublishError(String),

    // 基础错误
    #[error("IO操作失败：{0}")]
    IoError(#[from] IoError),
    #[error("URL解析失败：{0}")]
    UrlError(#[from] UrlParseError),
    #[error("无效输入：{0}")]
    InvalidInput(String),
    #[error("系统时间计算失败：{0}")]
    SystemTimeError(#[from] SystemTimeError),
}

// 全局Result类型
pub type RmResult<T> = Result<T, RuleMergeError>;
