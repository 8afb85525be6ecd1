//! Router behaviour tests for method dispatch.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use rstest::{fixture, rstest};
use serde_json::json;

use super::*;

#[fixture]
fn router() -> Router {
    Router::new()
}

fn constant(
    value: &'static str,
) -> impl Fn(&ResolvedArgs) -> Result<Outcome, DispatchError> + Send + Sync + 'static {
    move |_| Ok(Outcome::value(value))
}

fn returned_value(outcome: Outcome) -> serde_json::Value {
    match outcome {
        Outcome::Value(value) => value,
        other => panic!("expected a value, got {other:?}"),
    }
}

#[rstest]
fn unknown_methods_are_not_found(router: Router) {
    let error = router
        .dispatch("missing", &ResolvedArgs::default())
        .expect_err("nothing registered");
    assert!(matches!(error, DispatchError::MethodNotFound { ref method } if method == "missing"));
}

#[rstest]
fn extended_methods_are_invoked(router: Router) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let replaced = router.extend(MethodTable::new().with("m", Signature::none(), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Outcome::Void)
    }));

    assert!(replaced.is_empty());
    let outcome = router
        .dispatch("m", &ResolvedArgs::default())
        .expect("dispatch");
    assert!(matches!(outcome, Outcome::Void));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[rstest]
fn later_registrations_win_and_are_reported(router: Router) {
    router
        .register_static(MethodTable::new().with("m", Signature::none(), constant("static")))
        .expect("install static table");
    let replaced = router.extend(MethodTable::new().with("m", Signature::none(), constant("extension")));

    assert_eq!(replaced, vec!["m".to_owned()]);
    let outcome = router
        .dispatch("m", &ResolvedArgs::default())
        .expect("dispatch");
    assert_eq!(returned_value(outcome), json!("extension"));
}

#[rstest]
fn static_table_installs_only_once(router: Router) {
    router
        .register_static(MethodTable::new().with("a", Signature::none(), constant("a")))
        .expect("first install");
    let error = router
        .register_static(MethodTable::new().with("b", Signature::none(), constant("b")))
        .expect_err("second install");

    assert_eq!(error, RouterError::StaticTableInstalled);
    assert!(!router.contains("b"));
}

#[rstest]
fn handler_failures_propagate_unchanged(router: Router) {
    router.extend(MethodTable::new().with("fails", Signature::none(), |_| {
        Err(DispatchError::handler_failure("database is locked"))
    }));

    let error = router
        .dispatch("fails", &ResolvedArgs::default())
        .expect_err("handler fails");
    assert!(matches!(error, DispatchError::HandlerFailure { .. }));
    assert_eq!(error.to_string(), "database is locked");
}

#[rstest]
fn method_names_are_sorted(router: Router) {
    router.extend(
        MethodTable::new()
            .with("zeta", Signature::none(), constant("z"))
            .with("alpha", Signature::none(), constant("a")),
    );
    assert_eq!(router.method_names(), vec!["alpha".to_owned(), "zeta".to_owned()]);
}

#[rstest]
fn lookup_exposes_the_declared_signature(router: Router) {
    use crate::arguments::{Param, ParamKind};

    let signature = Signature::new([Param::required("name", ParamKind::String)]);
    router.extend(MethodTable::new().with("named", signature.clone(), constant("ok")));

    let entry = router.lookup("named").expect("lookup");
    assert_eq!(entry.name(), "named");
    assert_eq!(entry.signature(), &signature);
}

#[rstest]
fn extensions_become_visible_all_at_once(router: Router) {
    let router = Arc::new(router);
    let observers: Vec<_> = (0..4)
        .map(|_| {
            let router = Arc::clone(&router);
            thread::spawn(move || {
                for _ in 0..500 {
                    let names = router.method_names();
                    let has_first = names.iter().any(|name| name == "first");
                    let has_second = names.iter().any(|name| name == "second");
                    assert_eq!(has_first, has_second, "saw a partial table: {names:?}");
                }
            })
        })
        .collect();

    router.extend(
        MethodTable::new()
            .with("first", Signature::none(), constant("1"))
            .with("second", Signature::none(), constant("2")),
    );

    for observer in observers {
        observer.join().expect("observer thread");
    }
    assert!(router.contains("first") && router.contains("second"));
}
