use camino::{Utf8Path, Utf8PathBuf};
use std::cell::RefCell;

/// Environment variable that relocates the execwarden home directory.
pub const HOME_ENV: &str = "EXECWARDEN_HOME";

/// File name of the persisted last-invocation diagnostics record.
pub const LAST_INVOCATION_FILE: &str = "last-invocation.json";

// Thread-local override used only in tests to avoid process-global env races.
thread_local! {
    static THREAD_HOME: RefCell<Option<Utf8PathBuf>> = const { RefCell::new(None) };
}

/// Resolve execwarden home:
/// 1) thread-local override (tests use this)
/// 2) env `EXECWARDEN_HOME`
/// 3) default ".execwarden"
#[must_use]
pub fn execwarden_home() -> Utf8PathBuf {
    if let Some(tl) = THREAD_HOME.with(|tl| tl.borrow().clone()) {
        return tl;
    }
    if let Ok(p) = std::env::var(HOME_ENV) {
        return Utf8PathBuf::from(p);
    }
    Utf8PathBuf::from(".execwarden")
}

/// File name of the config file inside a home directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Returns `<home>/config.toml`
#[must_use]
pub fn config_file_in(home: &Utf8Path) -> Utf8PathBuf {
    home.join(CONFIG_FILE)
}

/// Returns `<EXECWARDEN_HOME>/diagnostics`
#[must_use]
pub fn diagnostics_dir() -> Utf8PathBuf {
    execwarden_home().join("diagnostics")
}

/// Returns `<EXECWARDEN_HOME>/diagnostics/last-invocation.json`
#[must_use]
pub fn last_invocation_path() -> Utf8PathBuf {
    diagnostics_dir().join(LAST_INVOCATION_FILE)
}

/// mkdir -p; treat `AlreadyExists` as success (removes TOCTTOU races)
pub fn ensure_dir_all<P: AsRef<std::path::Path>>(p: P) -> std::io::Result<()> {
    match std::fs::create_dir_all(&p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

/// RAII guard for isolated home that clears thread-local state on drop
#[cfg(any(test, feature = "test-utils"))]
pub struct HomeGuard {
    inner: tempfile::TempDir,
}

#[cfg(any(test, feature = "test-utils"))]
impl HomeGuard {
    /// The isolated home as a UTF-8 path.
    #[must_use]
    pub fn home(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.inner.path().to_path_buf())
            .unwrap_or_else(|p| Utf8PathBuf::from(p.to_string_lossy().into_owned()))
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Drop for HomeGuard {
    fn drop(&mut self) {
        THREAD_HOME.with(|tl| *tl.borrow_mut() = None);
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl std::ops::Deref for HomeGuard {
    type Target = tempfile::TempDir;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Test helper: give this thread a unique home under the system temp dir.
///
/// Hold the `HomeGuard` for the test's duration so the directory stays alive.
/// The override is thread-local, so multi-threaded runtimes must resolve paths
/// on the test thread before handing them to other tasks.
#[cfg(any(test, feature = "test-utils"))]
#[must_use]
pub fn with_isolated_home() -> HomeGuard {
    let td = tempfile::TempDir::new().expect("create temp home");
    let guard = HomeGuard { inner: td };
    let home = guard.home();
    THREAD_HOME.with(|tl| *tl.borrow_mut() = Some(home));
    guard
}
