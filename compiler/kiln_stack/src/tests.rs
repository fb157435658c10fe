use super::*;

#[test]
fn deep_recursion_grows_stack() {
    fn deep_recurse(n: u64) -> u64 {
        ensure_sufficient_stack(|| if n == 0 { 0 } else { deep_recurse(n - 1) + 1 })
    }

    assert_eq!(deep_recurse(100_000), 100_000);
}

#[test]
fn guard_tracks_depth() {
    let before = DepthGuard::current();
    {
        let _outer = DepthGuard::enter();
        assert_eq!(DepthGuard::current(), before + 1);
        {
            let _inner = DepthGuard::enter();
            assert_eq!(DepthGuard::current(), before + 2);
        }
        assert_eq!(DepthGuard::current(), before + 1);
    }
    assert_eq!(DepthGuard::current(), before);
}

#[test]
fn guard_rejects_past_limit() {
    let first = DepthGuard::enter_with_limit(DepthGuard::current() + 1);
    assert!(first.is_ok());
    let second = DepthGuard::enter_with_limit(DepthGuard::current());
    assert_eq!(second.err(), Some(DepthExceeded { limit: DepthGuard::current() }));
}
