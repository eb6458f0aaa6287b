use std::sync::{Arc, Mutex, PoisonError};

use crate::error::VfsResult;
use crate::types::DirEntry;

/// Core trait implemented by all backends.
///
/// Paths are `/`-separated. Relative paths resolve against the backend's
/// current directory. Mutating operations take `&mut self`; a backend is never
/// synchronized internally.
pub trait FileSystem: Send {
    fn is_case_sensitive(&self) -> bool;

    /// Removes a file or a directory with everything beneath it. The root is
    /// emptied instead of removed.
    fn delete(&mut self, path: &str) -> VfsResult<()>;

    /// Immediate children of a directory, directories first, each group in
    /// name order.
    fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>>;

    fn stat(&self, path: &str) -> VfsResult<DirEntry>;

    fn read_file(&self, path: &str, encoding: &str) -> VfsResult<String>;

    /// Creates or overwrites a file. The parent directory must exist.
    fn write_file(&mut self, path: &str, text: &str) -> VfsResult<()>;

    /// Creates a directory and any missing ancestors. Existing directories are
    /// left untouched.
    fn mkdir(&mut self, path: &str) -> VfsResult<()>;

    fn move_path(&mut self, src: &str, dest: &str) -> VfsResult<()>;

    /// Copies a file, or merges a directory's contents into `dest`,
    /// overwriting files that already exist there.
    fn copy_path(&mut self, src: &str, dest: &str) -> VfsResult<()>;

    fn file_exists(&self, path: &str) -> VfsResult<bool>;

    fn directory_exists(&self, path: &str) -> VfsResult<bool>;

    /// Canonical form of `path`.
    fn realpath(&self, path: &str) -> VfsResult<String>;

    fn current_directory(&self) -> VfsResult<String>;

    fn set_current_directory(&mut self, path: &str) -> VfsResult<()>;

    /// Files matching any of `patterns`, concatenated in pattern order.
    fn glob(&self, patterns: &[String]) -> VfsResult<Vec<String>>;
}

impl<F: FileSystem + ?Sized> FileSystem for Box<F> {
    fn is_case_sensitive(&self) -> bool {
        (**self).is_case_sensitive()
    }
    fn delete(&mut self, path: &str) -> VfsResult<()> {
        (**self).delete(path)
    }
    fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        (**self).read_dir(path)
    }
    fn stat(&self, path: &str) -> VfsResult<DirEntry> {
        (**self).stat(path)
    }
    fn read_file(&self, path: &str, encoding: &str) -> VfsResult<String> {
        (**self).read_file(path, encoding)
    }
    fn write_file(&mut self, path: &str, text: &str) -> VfsResult<()> {
        (**self).write_file(path, text)
    }
    fn mkdir(&mut self, path: &str) -> VfsResult<()> {
        (**self).mkdir(path)
    }
    fn move_path(&mut self, src: &str, dest: &str) -> VfsResult<()> {
        (**self).move_path(src, dest)
    }
    fn copy_path(&mut self, src: &str, dest: &str) -> VfsResult<()> {
        (**self).copy_path(src, dest)
    }
    fn file_exists(&self, path: &str) -> VfsResult<bool> {
        (**self).file_exists(path)
    }
    fn directory_exists(&self, path: &str) -> VfsResult<bool> {
        (**self).directory_exists(path)
    }
    fn realpath(&self, path: &str) -> VfsResult<String> {
        (**self).realpath(path)
    }
    fn current_directory(&self) -> VfsResult<String> {
        (**self).current_directory()
    }
    fn set_current_directory(&mut self, path: &str) -> VfsResult<()> {
        (**self).set_current_directory(path)
    }
    fn glob(&self, patterns: &[String]) -> VfsResult<Vec<String>> {
        (**self).glob(patterns)
    }
}

/// Deferred form of [`FileSystem`], for callers that hand out futures.
#[async_trait::async_trait]
pub trait AsyncFileSystem: Send + Sync + 'static {
    async fn is_case_sensitive(&self) -> VfsResult<bool>;

    async fn delete(&self, path: &str) -> VfsResult<()>;

    async fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>>;

    async fn stat(&self, path: &str) -> VfsResult<DirEntry>;

    async fn read_file(&self, path: &str, encoding: &str) -> VfsResult<String>;

    async fn write_file(&self, path: &str, text: &str) -> VfsResult<()>;

    async fn mkdir(&self, path: &str) -> VfsResult<()>;

    async fn move_path(&self, src: &str, dest: &str) -> VfsResult<()>;

    async fn copy_path(&self, src: &str, dest: &str) -> VfsResult<()>;

    async fn file_exists(&self, path: &str) -> VfsResult<bool>;

    async fn directory_exists(&self, path: &str) -> VfsResult<bool>;

    async fn realpath(&self, path: &str) -> VfsResult<String>;

    async fn current_directory(&self) -> VfsResult<String>;

    async fn set_current_directory(&self, path: &str) -> VfsResult<()>;

    async fn glob(&self, patterns: &[String]) -> VfsResult<Vec<String>>;
}

/// Shares one backend between synchronous callers and tokio tasks.
///
/// Each deferred call runs the synchronous operation on tokio's blocking pool.
/// The mutex only prevents simultaneous access; callers that need one call to
/// observe another must await them in order.
#[derive(Debug)]
pub struct Deferred<F> {
    inner: Arc<Mutex<F>>,
}

impl<F> Clone for Deferred<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: FileSystem + 'static> Deferred<F> {
    pub fn new(fs: F) -> Self {
        Self {
            inner: Arc::new(Mutex::new(fs)),
        }
    }

    /// Runs `op` on the calling thread.
    pub fn blocking<T>(&self, op: impl FnOnce(&mut F) -> T) -> T {
        let mut fs = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        op(&mut *fs)
    }

    async fn run<T, Op>(&self, op: Op) -> VfsResult<T>
    where
        T: Send + 'static,
        Op: FnOnce(&mut F) -> VfsResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut fs = inner.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut *fs)
        })
        .await?
    }
}

#[async_trait::async_trait]
impl<F: FileSystem + 'static> AsyncFileSystem for Deferred<F> {
    async fn is_case_sensitive(&self) -> VfsResult<bool> {
        self.run(|fs| Ok(fs.is_case_sensitive())).await
    }

    async fn delete(&self, path: &str) -> VfsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.delete(&path)).await
    }

    async fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let path = path.to_string();
        self.run(move |fs| fs.read_dir(&path)).await
    }

    async fn stat(&self, path: &str) -> VfsResult<DirEntry> {
        let path = path.to_string();
        self.run(move |fs| fs.stat(&path)).await
    }

    async fn read_file(&self, path: &str, encoding: &str) -> VfsResult<String> {
        let (path, encoding) = (path.to_string(), encoding.to_string());
        self.run(move |fs| fs.read_file(&path, &encoding)).await
    }

    async fn write_file(&self, path: &str, text: &str) -> VfsResult<()> {
        let (path, text) = (path.to_string(), text.to_string());
        self.run(move |fs| fs.write_file(&path, &text)).await
    }

    async fn mkdir(&self, path: &str) -> VfsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.mkdir(&path)).await
    }

    async fn move_path(&self, src: &str, dest: &str) -> VfsResult<()> {
        let (src, dest) = (src.to_string(), dest.to_string());
        self.run(move |fs| fs.move_path(&src, &dest)).await
    }

    async fn copy_path(&self, src: &str, dest: &str) -> VfsResult<()> {
        let (src, dest) = (src.to_string(), dest.to_string());
        self.run(move |fs| fs.copy_path(&src, &dest)).await
    }

    async fn file_exists(&self, path: &str) -> VfsResult<bool> {
        let path = path.to_string();
        self.run(move |fs| fs.file_exists(&path)).await
    }

    async fn directory_exists(&self, path: &str) -> VfsResult<bool> {
        let path = path.to_string();
        self.run(move |fs| fs.directory_exists(&path)).await
    }

    async fn realpath(&self, path: &str) -> VfsResult<String> {
        let path = path.to_string();
        self.run(move |fs| fs.realpath(&path)).await
    }

    async fn current_directory(&self) -> VfsResult<String> {
        self.run(|fs| fs.current_directory()).await
    }

    async fn set_current_directory(&self, path: &str) -> VfsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.set_current_directory(&path)).await
    }

    async fn glob(&self, patterns: &[String]) -> VfsResult<Vec<String>> {
        let patterns = patterns.to_vec();
        self.run(move |fs| fs.glob(&patterns)).await
    }
}
