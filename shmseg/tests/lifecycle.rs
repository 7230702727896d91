//! End-to-end lifecycle of named segments, in-process and across processes.
//!
//! The cross-process tests drive the `shmseg-demo` binary as the second
//! process. Set `RUST_LOG=shmseg=debug` and pass `--nocapture` to see every
//! OS call.

use std::process::Command;
use std::sync::Once;

use rustix::io::Errno;
use shmseg::{ShmError, ShmMap, ShmSegment, shmem};

static INIT_TRACING: Once = Once::new();

fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        shmseg::init_tracing();
    });
}

fn test_name(tag: &str) -> String {
    format!("/shmseg-it-{}-{tag}", std::process::id())
}

/// Creates `name` fresh, or returns `None` when the sandbox has no usable
/// `/dev/shm`.
fn fresh(test: &str, name: &str, size: u64) -> Option<std::os::fd::OwnedFd> {
    init_test_tracing();
    let _ = rustix::shm::unlink(name);
    match shmem::create_or_open(name, size) {
        Ok(fd) => Some(fd),
        Err(err @ ShmError::Open { source, .. })
            if source == Errno::ACCESS || source == Errno::NOENT =>
        {
            eprintln!("Skipping {test}: {err}");
            None
        }
        Err(err) => panic!("create_or_open({name}, {size}) failed: {err}"),
    }
}

fn demo() -> Command {
    Command::new(env!("CARGO_BIN_EXE_shmseg-demo"))
}

#[test]
fn first_writer_wins_then_unlink_resets() -> shmseg::Result<()> {
    let name = test_name("scenario");
    let Some(first) = fresh("first_writer_wins_then_unlink_resets", &name, 4096) else {
        return Ok(());
    };
    assert_eq!(shmem::query_size(&first)?, 4096);

    let second = shmem::create_or_open(&name, 8192)?;
    assert_eq!(shmem::query_size(&second)?, 4096);

    shmem::unlink(&name)?;

    let third = shmem::create_or_open(&name, 2048)?;
    assert_eq!(shmem::query_size(&third)?, 2048);

    // Handles to the unlinked object still see the old one.
    assert_eq!(shmem::query_size(&first)?, 4096);

    drop((first, second, third));
    shmem::unlink(&name)
}

#[test]
fn unlink_of_unknown_name_is_reported_not_fatal() {
    init_test_tracing();
    let err = shmem::unlink(&test_name("never")).unwrap_err();
    assert!(matches!(err, ShmError::Unlink { .. }));
    assert!(err.to_string().starts_with("shm_unlink failed for `/shmseg-it-"));
}

#[cfg(target_os = "linux")]
#[test]
fn invalid_name_fails_at_open() {
    init_test_tracing();
    let err = shmem::create_or_open("/not/a/valid/name", 4096).unwrap_err();
    assert!(matches!(err, ShmError::Open { .. }), "{err}");
}

#[test]
fn unlinked_object_lives_while_mapped() -> shmseg::Result<()> {
    let name = test_name("orphan");
    let Some(fd) = fresh("unlinked_object_lives_while_mapped", &name, 128) else {
        return Ok(());
    };
    let map = ShmMap::new(&fd, 128)?;
    drop(fd);
    shmem::unlink(&name)?;

    unsafe {
        map.as_mut_slice().fill(0x5a);
        assert!(map.as_slice().iter().all(|&b| b == 0x5a));
    }

    // The name is free again.
    let seg = ShmSegment::create_or_open(&name, 64)?;
    assert!(seg.created());
    assert_eq!(seg.size(), 64);
    seg.unlink()
}

#[test]
fn second_process_attaches_with_first_size() -> shmseg::Result<()> {
    let name = test_name("xproc");
    let Some(fd) = fresh("second_process_attaches_with_first_size", &name, 4096) else {
        return Ok(());
    };
    let map = ShmMap::new(&fd, 4096)?;
    unsafe { map.as_mut_slice().fill(0xff) };

    let out = demo()
        .args(["--name", &name, "--size", "8192", "--keep"])
        .output()
        .expect("run shmseg-demo");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(
        String::from_utf8_lossy(&out.stdout).trim(),
        format!("{name} 4096 attached")
    );

    // The demo wrote `i % 256` through its own mapping.
    unsafe {
        assert_eq!(map.as_slice()[10], 10);
        assert_eq!(map.as_slice()[4095], 255);
    }
    assert_eq!(shmem::query_size(&fd)?, 4096);

    shmem::unlink(&name)?;
    drop(fd);

    // Fresh creation in the child honors its own size, then it unlinks.
    let out = demo()
        .args(["--name", &name, "--size", "2048"])
        .output()
        .expect("run shmseg-demo");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(
        String::from_utf8_lossy(&out.stdout).trim(),
        format!("{name} 2048 created")
    );
    assert!(matches!(shmem::unlink(&name), Err(ShmError::Unlink { .. })));
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn demo_exits_nonzero_when_create_fails() {
    let out = demo()
        .args(["--name", "/not/valid"])
        .output()
        .expect("run shmseg-demo");
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("shm_open failed for `/not/valid`"));
    assert!(out.stdout.is_empty());
}

#[test]
fn demo_exclusive_attaches_then_unlinks() -> shmseg::Result<()> {
    let name = test_name("demo-default");
    let Some(fd) = fresh("demo_exclusive_attaches_then_unlinks", &name, 512) else {
        return Ok(());
    };
    drop(fd);

    let out = demo()
        .args(["--name", &name, "--exclusive"])
        .output()
        .expect("run shmseg-demo");
    assert!(out.status.success());
    assert_eq!(
        String::from_utf8_lossy(&out.stdout).trim(),
        format!("{name} 512 attached")
    );

    // The demo unlinked the name on exit.
    let err = shmem::unlink(&name).unwrap_err();
    assert_eq!(err.errno(), Some(Errno::NOENT));
    Ok(())
}
