//! Filesystem and network confinement for sandboxed children.
//!
//! On Linux the child unshares its user, mount and network namespaces and
//! pivots into the scratch directory before `exec`. Host system directories
//! are bind-mounted read-only, `/dev/null` is bound in, and only `/work` is
//! writable. Nothing else on the host is reachable from inside.

use std::ffi::CString;
use std::io;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use super::executor::WORK_DIR;

/// Paths resolved in the parent and handed to the child.
///
/// Everything the child needs is allocated up front: the `pre_exec` hook
/// only issues syscalls on these buffers.
#[derive(Debug)]
pub(super) struct RootPlan {
    root: CString,
    work: CString,
    binds: Vec<(CString, CString)>,
    dev_null: Option<(CString, CString)>,
    uid_map: Vec<u8>,
    gid_map: Vec<u8>,
}

/// Lays out `root` as the child's future `/` and records the mounts to make.
///
/// Missing host paths are skipped. Host symlinks (`/bin -> usr/bin` on
/// merged-usr systems) are recreated as symlinks instead of mounted.
pub(super) fn prepare_root(root: &Path, read_only: &[PathBuf]) -> io::Result<RootPlan> {
    let work = root.join(WORK_DIR);
    std::fs::create_dir_all(&work)?;

    let mut binds = Vec::new();
    for path in read_only {
        let relative = match path.strip_prefix("/") {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(_) => continue,
        };
        let target = root.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if meta.file_type().is_symlink() {
            symlink(&std::fs::read_link(path)?, &target)?;
        } else if meta.is_dir() {
            std::fs::create_dir_all(&target)?;
            binds.push((c_path(path)?, c_path(&target)?));
        }
    }

    let host_null = Path::new("/dev/null");
    let dev_null = if host_null.exists() {
        let target = root.join("dev/null");
        std::fs::create_dir_all(root.join("dev"))?;
        std::fs::File::create(&target)?;
        Some((c_path(host_null)?, c_path(&target)?))
    } else {
        None
    };

    let (uid, gid) = current_ids();
    Ok(RootPlan {
        root: c_path(root)?,
        work: c_path(&work)?,
        binds,
        dev_null,
        uid_map: format!("{} {} 1\n", uid, uid).into_bytes(),
        gid_map: format!("{} {} 1\n", gid, gid).into_bytes(),
    })
}

fn c_path(path: &Path) -> io::Result<CString> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
}

fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

fn current_ids() -> (u32, u32) {
    // SAFETY: getuid and getgid cannot fail and touch no memory.
    unsafe { (libc::getuid(), libc::getgid()) }
}

/// Confine the child to `plan` between `fork` and `exec`.
#[cfg(target_os = "linux")]
pub(super) fn apply_isolation(cmd: &mut Command, plan: RootPlan) {
    // SAFETY: the hook runs in the single-threaded child after fork. It only
    // calls raw syscalls on buffers allocated before the fork and builds
    // errors with `last_os_error`, which does not allocate.
    unsafe {
        cmd.pre_exec(move || linux::enter(&plan));
    }
}

#[cfg(not(target_os = "linux"))]
pub(super) fn apply_isolation(cmd: &mut Command, _plan: RootPlan) {
    // SAFETY: the hook builds an error from a kind, which does not allocate.
    unsafe {
        cmd.pre_exec(|| Err(io::Error::from(io::ErrorKind::Unsupported)));
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use std::ffi::CStr;
    use std::io;

    use libc::{c_char, c_ulong};

    use super::RootPlan;

    // Linux ABI value; libc only exports it for glibc targets.
    const ST_RELATIME: c_ulong = 4096;

    const ROOT: &[u8] = b"/\0";
    const DOT: &[u8] = b".\0";
    const WORK: &[u8] = b"/work\0";
    const SETGROUPS: &[u8] = b"/proc/self/setgroups\0";
    const UID_MAP: &[u8] = b"/proc/self/uid_map\0";
    const GID_MAP: &[u8] = b"/proc/self/gid_map\0";

    fn ptr(bytes: &'static [u8]) -> *const c_char {
        bytes.as_ptr().cast()
    }

    fn check(ret: libc::c_long) -> io::Result<()> {
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    pub(super) fn enter(plan: &RootPlan) -> io::Result<()> {
        // SAFETY: every pointer below is a NUL-terminated buffer that lives
        // for the whole call; the syscalls do not retain them.
        unsafe {
            check(libc::unshare(libc::CLONE_NEWUSER | libc::CLONE_NEWNS | libc::CLONE_NEWNET).into())?;
            write_file(ptr(SETGROUPS), b"deny")?;
            write_file(ptr(UID_MAP), &plan.uid_map)?;
            write_file(ptr(GID_MAP), &plan.gid_map)?;

            mount(std::ptr::null(), ptr(ROOT), libc::MS_REC | libc::MS_PRIVATE)?;
            mount(plan.root.as_ptr(), plan.root.as_ptr(), libc::MS_BIND | libc::MS_REC)?;
            mount(plan.work.as_ptr(), plan.work.as_ptr(), libc::MS_BIND)?;
            for (source, target) in &plan.binds {
                mount(source.as_ptr(), target.as_ptr(), libc::MS_BIND | libc::MS_REC)?;
                remount_read_only(target)?;
            }
            if let Some((source, target)) = &plan.dev_null {
                mount(source.as_ptr(), target.as_ptr(), libc::MS_BIND)?;
            }
            remount_read_only(&plan.root)?;

            check(libc::chdir(plan.root.as_ptr()).into())?;
            check(libc::syscall(libc::SYS_pivot_root, ptr(DOT), ptr(DOT)))?;
            check(libc::umount2(ptr(DOT), libc::MNT_DETACH).into())?;
            check(libc::chdir(ptr(WORK)).into())?;
        }
        Ok(())
    }

    unsafe fn mount(source: *const c_char, target: *const c_char, flags: c_ulong) -> io::Result<()> {
        check(libc::mount(source, target, std::ptr::null(), flags, std::ptr::null()).into())
    }

    /// Remounts a bind mount read-only, keeping the flags the kernel locks
    /// inside a user namespace.
    unsafe fn remount_read_only(target: &CStr) -> io::Result<()> {
        let mut stat: libc::statvfs = std::mem::zeroed();
        check(libc::statvfs(target.as_ptr(), &mut stat).into())?;

        let mut flags = libc::MS_REMOUNT | libc::MS_BIND | libc::MS_RDONLY | libc::MS_NOSUID;
        let kept = [
            (libc::ST_NODEV, libc::MS_NODEV),
            (libc::ST_NOEXEC, libc::MS_NOEXEC),
            (libc::ST_NOATIME, libc::MS_NOATIME),
            (libc::ST_NODIRATIME, libc::MS_NODIRATIME),
            (ST_RELATIME, libc::MS_RELATIME),
        ];
        for (st, ms) in kept {
            if stat.f_flag & st != 0 {
                flags |= ms;
            }
        }
        mount(std::ptr::null(), target.as_ptr(), flags)
    }

    unsafe fn write_file(path: *const c_char, data: &[u8]) -> io::Result<()> {
        let fd = libc::open(path, libc::O_WRONLY | libc::O_CLOEXEC);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let written = libc::write(fd, data.as_ptr().cast(), data.len());
        libc::close(fd);
        if written < 0 || written as usize != data.len() {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
