//! 파일 배치
//!
//! 요청 이름에서 디렉터리 경로를 제거하고 마지막 구성 요소만 쓴다.
//! 저장은 임시 파일에 쓴 뒤 이름을 바꾸므로 실패해도 부분 파일이 남지 않는다.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Error, Result};

/// 요청 이름에서 안전한 파일 이름 추출
///
/// `/`와 `\` 모두 구분자로 취급한다. `.`, `..`, 빈 이름은 거부.
pub fn safe_file_name(name: &str) -> Option<&str> {
    let base = name.trim().rsplit(|c: char| c == '/' || c == '\\').next()?;
    match base {
        "" | "." | ".." => None,
        _ => Some(base),
    }
}

/// 디렉터리 아래 경로 결정
pub fn resolve(dir: &Path, name: &str) -> Result<PathBuf> {
    safe_file_name(name)
        .map(|base| dir.join(base))
        .ok_or_else(|| Error::InvalidFilename(name.to_string()))
}

/// 데이터를 원자적으로 저장
pub async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let write_error = |source: std::io::Error| Error::WriteError {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.part", file_name));

    if let Err(e) = tokio::fs::write(&tmp, data).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_error(e));
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_error(e));
    }

    debug!("파일 저장: {:?} ({} bytes)", path, data.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("report.bin"), Some("report.bin"));
        assert_eq!(safe_file_name("../../etc/passwd"), Some("passwd"));
        assert_eq!(safe_file_name("dir\\sub\\a.txt"), Some("a.txt"));
        assert_eq!(safe_file_name("  spaced.txt \n"), Some("spaced.txt"));
        assert_eq!(safe_file_name(""), None);
        assert_eq!(safe_file_name(".."), None);
        assert_eq!(safe_file_name("dir/"), None);
    }

    #[tokio::test]
    async fn test_write_atomic_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.bin");

        write_atomic(&path, b"payload").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
        assert!(!dir.path().join("nested").join(".out.bin.part").exists());
    }

    #[tokio::test]
    async fn test_write_atomic_failure_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        // 부모 경로가 파일이면 디렉터리 생성 실패
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let path = blocker.join("out.bin");

        let result = write_atomic(&path, b"payload").await;
        assert!(matches!(result, Err(Error::WriteError { .. })));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_write_atomic_rename_failure_removes_part() {
        let dir = tempfile::tempdir().unwrap();
        // 대상이 비어 있지 않은 디렉터리면 이름 바꾸기 실패
        let path = dir.path().join("out.bin");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        let result = write_atomic(&path, b"payload").await;
        assert!(matches!(result, Err(Error::WriteError { .. })));
        assert!(!dir.path().join(".out.bin.part").exists());
        assert!(path.join("keep").exists());
    }
}
