use std::fmt::{self, Write};

// ======================== 核心：零堆分配字符串预览 ========================
/// 空白字符折叠 + 截断，用于日志中预览规则行/响应体
/// 遍历到最大长度立即终止，不创建中间 String
#[inline(always)]
pub fn preview_compact<'a>(s: &'a str, max_len: usize) -> impl fmt::Display + 'a {
    struct CompactView<'a> {
        source: &'a str,
        max_length: usize,
    }

    impl<'a> fmt::Display for CompactView<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let mut char_count = 0;
            let mut last_was_whitespace = false;

            for ch in self.source.chars() {
                if char_count >= self.max_length {
                    f.write_str("…")?;
                    break;
                }

                if ch.is_whitespace() {
                    if !last_was_whitespace {
                        f.write_char(' ')?;
                        char_count += 1;
                        last_was_whitespace = true;
                    }
                } else {
                    f.write_char(ch)?;
                    char_count += 1;
                    last_was_whitespace = false;
                }
            }
            Ok(())
        }
    }

    CompactView {
        source: s,
        max_length: max_len,
    }
}

// ======================== 衍生：列表日志格式化 ========================
/// 格式：[item1, item2, ...… (total: N)]
pub fn preview_list<S: AsRef<str>>(items: &[S]) -> String {
    if items.is_empty() {
        return "[empty]".to_string();
    }

    const MAX_COUNT: usize = 5;
    const MAX_ITEM_LEN: usize = 60;

    let mut result = String::from("[");
    for (idx, item) in items.iter().take(MAX_COUNT).enumerate() {
        if idx > 0 {
            result.push_str(", ");
        }
        let _ = write!(result, "{}", preview_compact(item.as_ref(), MAX_ITEM_LEN));
    }
    if items.len() > MAX_COUNT {
        let _ = write!(result, "… (total: {})", items.len());
    }
    result.push(']');
    result
}
