//! 提醒指令提取
//!
//! 从生成文本中扫描 `/remind_<keyword>_<H[H]><h|:><MM>` 指令。纯函数，不做数值范围校验
//! （25h99 在语法上同样被接受），时间合法性由调度器判定。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 标题前缀
pub const TITLE_PREFIX: &str = "Reminder: ";

/// 从文本中解析出的一条提醒请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub title: String,
    /// 本地挂钟时间 "H:MM"，小时不补零，分钟原样保留
    pub time: String,
    pub raw_command: String,
}

fn directive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/remind_(\w+)_(\d{1,2})[h:](\d{2})").expect("directive regex is valid")
    })
}

/// 扫描全部指令，按首次出现顺序返回；重复指令不去重
pub fn extract_alerts(text: &str) -> Vec<AlertRequest> {
    directive_regex()
        .captures_iter(text)
        .map(|caps| {
            let keyword = &caps[1];
            AlertRequest {
                title: format!("{}{}", TITLE_PREFIX, humanize_keyword(keyword)),
                time: format!("{}:{}", &caps[2], &caps[3]),
                raw_command: caps[0].to_string(),
            }
        })
        .collect()
}

/// 下划线转空格并按词首字母大写：字母前一个字符不是字母时大写，否则小写
pub fn humanize_keyword(keyword: &str) -> String {
    let mut out = String::with_capacity(keyword.len());
    let mut prev_is_alpha = false;
    for ch in keyword.chars() {
        let ch = if ch == '_' { ' ' } else { ch };
        if ch.is_alphabetic() {
            if prev_is_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_alpha = true;
        } else {
            out.push(ch);
            prev_is_alpha = false;
        }
    }
    out
}
