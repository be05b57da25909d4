//! 画像ファイル解決モジュール
//!
//! 品番と同名（拡張子を除く、大文字小文字を区別しない）の画像を
//! フォルダ直下から探す。同名で拡張子違いが複数ある場合は
//! `EXTENSION_PRIORITY` の順で1つに決める（列挙順には依存しない）。

use crate::error::{ImageToExcelError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// 対応拡張子（優先順）
pub const EXTENSION_PRIORITY: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

/// 拡張子の優先度（小さいほど優先）。未対応ならNone
pub fn extension_priority(ext: &str) -> Option<usize> {
    let ext = ext.to_ascii_lowercase();
    EXTENSION_PRIORITY.iter().position(|&e| e == ext)
}

#[derive(Debug, Clone)]
struct Candidate {
    priority: usize,
    file_name: String,
    path: PathBuf,
}

impl Candidate {
    fn sort_key(&self) -> (usize, &str) {
        (self.priority, self.file_name.as_str())
    }
}

/// 画像フォルダの索引（品番 → 画像パス）
///
/// 一度スキャンした後は読み取り専用なので、ワーカー間で共有できる。
#[derive(Debug, Clone, Default)]
pub struct ImageIndex {
    entries: HashMap<String, Candidate>,
}

impl ImageIndex {
    /// フォルダ直下をスキャンして索引を作る
    pub fn scan(folder: &Path) -> Result<Self> {
        if !folder.is_dir() {
            return Err(ImageToExcelError::FolderNotFound(folder.display().to_string()));
        }

        let mut index = Self::default();

        for entry in WalkDir::new(folder)
            .min_depth(1)
            .max_depth(1)  // 直下のみ（再帰しない）
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let (Some(stem), Some(ext)) = (path.file_stem(), path.extension()) else {
                continue;
            };
            let Some(priority) = extension_priority(&ext.to_string_lossy()) else {
                continue;
            };

            let file_name = entry.file_name().to_string_lossy().to_string();
            index.insert(
                &stem.to_string_lossy(),
                Candidate {
                    priority,
                    file_name,
                    path: path.to_path_buf(),
                },
            );
        }

        debug!(folder = %folder.display(), images = index.len(), "画像フォルダをスキャン");
        Ok(index)
    }

    fn insert(&mut self, stem: &str, candidate: Candidate) {
        let key = stem.to_lowercase();
        match self.entries.get(&key) {
            Some(current) if current.sort_key() <= candidate.sort_key() => {}
            _ => {
                self.entries.insert(key, candidate);
            }
        }
    }

    /// 品番に対応する画像パス。見つからなければNone（エラーではない）
    pub fn resolve(&self, code: &str) -> Option<&Path> {
        self.entries
            .get(&code.trim().to_lowercase())
            .map(|c| c.path.as_path())
    }

    /// 索引に登録された画像の件数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// フォルダから品番に対応する画像を1件解決する
pub fn resolve(folder: &Path, code: &str) -> Result<Option<PathBuf>> {
    let index = ImageIndex::scan(folder)?;
    Ok(index.resolve(code).map(Path::to_path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    #[test]
    fn test_extension_priority() {
        assert_eq!(extension_priority("png"), Some(0));
        assert_eq!(extension_priority("JPG"), Some(1));
        assert_eq!(extension_priority("webp"), Some(5));
        assert!(extension_priority("txt").is_none());
        assert!(extension_priority("tiff").is_none());
    }

    #[test]
    fn test_scan_folder_not_found() {
        let result = ImageIndex::scan(Path::new("/nonexistent/folder"));
        assert!(matches!(result, Err(ImageToExcelError::FolderNotFound(_))));
    }

    #[test]
    fn test_resolve_case_insensitive() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "p001.PNG");

        let index = ImageIndex::scan(dir.path()).unwrap();
        let path = index.resolve("P001").expect("画像が見つからない");
        assert_eq!(path.file_name().unwrap(), "p001.PNG");
    }

    #[test]
    fn test_resolve_missing_is_none() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "A1.png");
        touch(dir.path(), "A2.txt");

        let index = ImageIndex::scan(dir.path()).unwrap();
        assert!(index.resolve("A2").is_none());
        assert!(index.resolve("A3").is_none());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_resolve_priority_png_over_jpg() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "B1.jpg");
        touch(dir.path(), "B1.gif");
        touch(dir.path(), "B1.png");

        for _ in 0..5 {
            let found = resolve(dir.path(), "B1").unwrap().unwrap();
            assert_eq!(found.extension().unwrap(), "png");
        }
    }

    #[test]
    fn test_resolve_priority_full_order() {
        let dir = tempdir().unwrap();
        for ext in ["webp", "gif", "bmp", "jpeg", "jpg"] {
            touch(dir.path(), &format!("C1.{}", ext));
        }
        let found = resolve(dir.path(), "C1").unwrap().unwrap();
        assert_eq!(found.extension().unwrap(), "jpg");

        fs::remove_file(dir.path().join("C1.jpg")).unwrap();
        let found = resolve(dir.path(), "C1").unwrap().unwrap();
        assert_eq!(found.extension().unwrap(), "jpeg");
    }

    #[test]
    fn test_subfolders_are_ignored() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested"), "D1.png");
        fs::create_dir(dir.path().join("D2.png")).unwrap();

        let index = ImageIndex::scan(dir.path()).unwrap();
        assert!(index.resolve("D1").is_none());
        assert!(index.resolve("D2").is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_resolve_trims_code() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "E1.jpeg");
        let index = ImageIndex::scan(dir.path()).unwrap();
        assert!(index.resolve("  e1 ").is_some());
    }
}
