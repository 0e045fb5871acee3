//! Per-worker scratch copies of the project.

use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;

/// An isolated copy of the project owned by exactly one worker slot.
/// Removed from disk when dropped.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

/// A file in a workspace currently holding mutant text.
#[derive(Debug)]
pub struct Applied {
    path: PathBuf,
    original: Vec<u8>,
}

impl Workspace {
    /// Copy `project_root` into a fresh temporary directory.
    pub async fn create(project_root: &Path) -> Result<Self> {
        let project_root = project_root.to_path_buf();

        // Use spawn_blocking since fs_extra::dir::copy is synchronous
        let dir = tokio::task::spawn_blocking(move || -> Result<TempDir> {
            let dir = tempfile::TempDir::with_prefix("rimutate-")?;

            let options = fs_extra::dir::CopyOptions {
                overwrite: false,
                skip_exist: false,
                buffer_size: 64 * 1024,
                copy_inside: true,
                content_only: true,
                depth: 0,
            };

            fs_extra::dir::copy(&project_root, dir.path(), &options).map_err(|e| {
                anyhow::anyhow!("Failed to copy project {:?}: {}", project_root, e)
            })?;

            Ok(dir)
        })
        .await??;

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Overwrite `file` (relative to the project root) with mutant text,
    /// keeping the original bytes for [`Workspace::restore`].
    pub async fn apply(&self, file: &Path, contents: &str) -> Result<Applied> {
        let path = self.resolve(file)?;
        let original = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {:?} in workspace", path))?;
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("Failed to write mutant to {:?}", path))?;
        Ok(Applied { path, original })
    }

    pub async fn restore(&self, applied: Applied) -> Result<()> {
        tokio::fs::write(&applied.path, &applied.original)
            .await
            .with_context(|| format!("Failed to restore {:?}", applied.path))
    }

    fn resolve(&self, file: &Path) -> Result<PathBuf> {
        let escapes = file
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            bail!("{:?} is not a path inside the project", file);
        }
        Ok(self.dir.path().join(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.php"), "return 1;\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_create_copies_project() {
        let project = project();
        let workspace = Workspace::create(project.path()).await.unwrap();

        assert_ne!(workspace.path(), project.path());
        let copied = std::fs::read_to_string(workspace.path().join("src/a.php")).unwrap();
        assert_eq!(copied, "return 1;\n");
    }

    #[tokio::test]
    async fn test_apply_and_restore() {
        let project = project();
        let workspace = Workspace::create(project.path()).await.unwrap();
        let file = Path::new("src/a.php");

        let applied = workspace.apply(file, "return 2;\n").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(workspace.path().join(file)).unwrap(),
            "return 2;\n"
        );
        // The project itself is never touched.
        assert_eq!(
            std::fs::read_to_string(project.path().join(file)).unwrap(),
            "return 1;\n"
        );

        workspace.restore(applied).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(workspace.path().join(file)).unwrap(),
            "return 1;\n"
        );
    }

    #[tokio::test]
    async fn test_apply_rejects_paths_outside_project() {
        let project = project();
        let workspace = Workspace::create(project.path()).await.unwrap();

        assert!(workspace.apply(Path::new("../x.php"), "").await.is_err());
        assert!(workspace.apply(Path::new("/etc/hosts"), "").await.is_err());
        assert!(workspace.apply(Path::new("src/missing.php"), "").await.is_err());
    }

    #[tokio::test]
    async fn test_workspace_removed_on_drop() {
        let project = project();
        let workspace = Workspace::create(project.path()).await.unwrap();
        let path = workspace.path().to_path_buf();
        drop(workspace);
        assert!(!path.exists());
    }
}
