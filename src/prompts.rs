//! 系统提示词加载
//!
//! 目录约定：`<prompts_dir>/base.txt` 为公共部分（必须存在），`<prompts_dir>/agents/<category>.txt`
//! 为分类专属部分（可缺省）。最终提示词 = base + "\n\n" + 分类部分。

use std::io;
use std::path::{Path, PathBuf};

pub const BASE_PROMPT_FILE: &str = "base.txt";
pub const AGENT_PROMPTS_DIR: &str = "agents";

pub fn base_prompt_path(dir: &Path) -> PathBuf {
    dir.join(BASE_PROMPT_FILE)
}

pub fn category_prompt_path(dir: &Path, category: &str) -> PathBuf {
    dir.join(AGENT_PROMPTS_DIR).join(format!("{category}.txt"))
}

/// 读取公共提示词；缺失时由调用方终止启动
pub fn load_base_prompt(dir: impl AsRef<Path>) -> io::Result<String> {
    std::fs::read_to_string(base_prompt_path(dir.as_ref()))
}

/// 组装分类提示词；分类文件缺失时只用公共部分
pub fn category_prompt(dir: impl AsRef<Path>, base: &str, category: &str) -> String {
    let path = category_prompt_path(dir.as_ref(), category);
    let specific = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(category, path = %path.display(), error = %e, "Category prompt not found, using base only");
            String::new()
        }
    };
    format!("{base}\n\n{specific}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_base_plus_category() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(AGENT_PROMPTS_DIR)).unwrap();
        std::fs::write(dir.path().join(BASE_PROMPT_FILE), "You are an analyst.").unwrap();
        std::fs::write(category_prompt_path(dir.path(), "finance"), "Focus on gold and VN-Index.").unwrap();

        let base = load_base_prompt(dir.path()).unwrap();
        assert_eq!(
            category_prompt(dir.path(), &base, "finance"),
            "You are an analyst.\n\nFocus on gold and VN-Index."
        );
        assert_eq!(category_prompt(dir.path(), &base, "tech"), "You are an analyst.\n\n");
    }

    #[test]
    fn test_missing_base_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(load_base_prompt(dir.path()).is_err());
    }
}
