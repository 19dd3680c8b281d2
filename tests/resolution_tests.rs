//! Function resolution through the namespace registry and shared cache

use chaos_trials::action::{
    Action, ActionEntry, ActionModule, ActionProvider, FunctionCache, FunctionLoader, NamespaceRegistry,
};
use chaos_trials::credential::CredentialRegistry;
use chaos_trials::experiment::Step;
use chaos_trials::Error;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Provider that counts how often its exports are inspected.
struct CountingProvider {
    exports_calls: Arc<AtomicUsize>,
    entry: ActionEntry,
}

impl ActionProvider for CountingProvider {
    fn exports(&self) -> BTreeSet<String> {
        self.exports_calls.fetch_add(1, Ordering::SeqCst);
        BTreeSet::from(["stop_app".to_string()])
    }

    fn get(&self, name: &str) -> Option<ActionEntry> {
        (name == "stop_app").then(|| self.entry.clone())
    }
}

fn counting_registry() -> (NamespaceRegistry, Arc<AtomicUsize>) {
    let exports_calls = Arc::new(AtomicUsize::new(0));
    let provider = CountingProvider {
        exports_calls: Arc::clone(&exports_calls),
        entry: ActionEntry::function(|_| Ok(json!("stopped"))),
    };
    (NamespaceRegistry::new().register("cf", provider), exports_calls)
}

#[test]
fn test_cache_hit_skips_module_search() {
    let (registry, exports_calls) = counting_registry();
    let cache = FunctionCache::new();
    let loader = FunctionLoader::new(&registry, &cache);

    let first = loader.resolve_function("cf", "stop_app").unwrap();
    assert_eq!(exports_calls.load(Ordering::SeqCst), 1);

    for _ in 0..5 {
        let again = loader.resolve_function("cf", "stop_app").unwrap();
        assert!(again.ptr_eq(&first));
    }
    assert_eq!(exports_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_cache_shared_between_loaders() {
    let (registry, exports_calls) = counting_registry();
    let cache = FunctionCache::new();

    let first = FunctionLoader::new(&registry, &cache)
        .resolve_function("cf", "stop_app")
        .unwrap();
    let second = FunctionLoader::new(&registry, &cache)
        .resolve_function("cf", "stop_app")
        .unwrap();

    assert!(first.ptr_eq(&second));
    assert_eq!(exports_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failed_lookup_is_not_cached() {
    let (registry, exports_calls) = counting_registry();
    let cache = FunctionCache::new();
    let loader = FunctionLoader::new(&registry, &cache);

    for _ in 0..2 {
        let err = loader.resolve_function("cf", "start_app").unwrap_err();
        assert_eq!(err.to_string(), "Could not find function: cf.start_app");
    }
    assert_eq!(exports_calls.load(Ordering::SeqCst), 2);
    assert!(cache.is_empty());
}

#[test]
fn test_first_exporting_submodule_wins() {
    let first = ActionModule::new().function("scale", |_| Ok(json!("first")));
    let second = ActionModule::new().function("scale", |_| Ok(json!("second")));
    let registry = NamespaceRegistry::new().register(
        "k8s",
        ActionModule::new()
            .submodule(Arc::new(first))
            .submodule(Arc::new(second)),
    );
    let cache = FunctionCache::new();
    let loader = FunctionLoader::new(&registry, &cache);

    let entry = loader.resolve_function("k8s", "scale").unwrap();
    let ActionEntry::Function(function) = entry else {
        panic!("expected a function entry");
    };
    assert_eq!(function(&serde_json::Map::new()).unwrap(), json!("first"));
}

#[test]
fn test_namespace_module_shadows_submodules() {
    let sub = ActionModule::new().function("get_app", |_| Ok(json!("sub")));
    let registry = NamespaceRegistry::new().register(
        "cf",
        ActionModule::new()
            .function("get_app", |_| Ok(json!("top")))
            .submodule(Arc::new(sub)),
    );
    let cache = FunctionCache::new();
    let step = Step::from_value(&json!({"do": "cf.get_app", "where": {"app_name": "web"}})).unwrap();

    let mut action = Action::build(
        &step,
        &FunctionLoader::new(&registry, &cache),
        &CredentialRegistry::with_defaults(),
    )
    .unwrap();
    assert_eq!(action.execute().unwrap(), json!("top"));
}

#[test]
fn test_unknown_namespace_through_action_build() {
    let registry = NamespaceRegistry::new();
    let cache = FunctionCache::new();
    let step = Step::from_value(&json!({"do": "aws.reboot", "where": {"app_name": "web"}})).unwrap();

    let err = Action::build(
        &step,
        &FunctionLoader::new(&registry, &cache),
        &CredentialRegistry::with_defaults(),
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::UnknownNamespace(namespace)) if namespace == "aws"
    ));
}

#[test]
fn test_concurrent_resolution_converges() {
    let (registry, _) = counting_registry();
    let registry = Arc::new(registry);
    let cache = Arc::new(FunctionCache::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                FunctionLoader::new(&registry, &cache)
                    .resolve_function("cf", "stop_app")
                    .unwrap()
            })
        })
        .collect();
    let entries: Vec<ActionEntry> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(cache.len(), 1);
    let cached = cache.get("cf", "stop_app").unwrap();
    assert!(entries.iter().all(|entry| entry.ptr_eq(&cached)));
}
