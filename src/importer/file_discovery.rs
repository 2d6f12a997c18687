// ==========================================
// KML 批量导入 - 源文件发现
// ==========================================
// 职责: 递归扫描目录，按扩展名筛选，按路径字典序排序
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// 扫描目录下指定扩展名的文件
///
/// # 规则
/// - 递归扫描，不跟随符号链接
/// - 扩展名比较不区分大小写
/// - 结果按路径字典序排序（保证批次处理顺序可复现）
///
/// # 返回
/// - Err(DirectoryNotFound): 目录不存在
/// - Ok(空列表): 目录存在但无匹配文件（由调用方决定是否中止）
pub fn discover_source_files(dir: &Path, extension: &str) -> ImportResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ImportError::DirectoryNotFound(dir.display().to_string()));
    }

    let extension = extension.trim_start_matches('.');
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "目录项读取失败，已跳过");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if matches {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}
