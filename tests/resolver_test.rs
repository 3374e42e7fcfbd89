//! 跨作用域解析的集成测试

#![allow(clippy::uninlined_format_args)]

use wiregraph::errors::DuplicateReason;
use wiregraph::graph::{BindingLevel, ScopeId, UnitId};
use wiregraph::{BuildContext, Key, Precedence, WireError};

fn key(name: &str) -> Key {
    Key::named(name)
}

/// app
/// ├── web（导出 Api）
/// └── jobs（导出 Scheduler）
fn two_children() -> (BuildContext, ScopeId, ScopeId) {
    let mut ctx = BuildContext::new("app");
    let root = ctx.root();
    let web = ctx.add_child(root, "web").unwrap();
    let jobs = ctx.add_child(root, "jobs").unwrap();
    (ctx, web, jobs)
}

#[test]
fn test_every_key_has_at_most_one_provider_per_scope() {
    let mut ctx = BuildContext::new("app");
    let root = ctx.root();
    let a = ctx.add_bean(root, "PrimaryDb").unwrap();
    let b = ctx.add_bean(root, "ReplicaDb").unwrap();

    ctx.provide(a, key("Db"), true).unwrap();
    let err = ctx.provide(b, key("Db"), true).unwrap_err();
    match err {
        WireError::DuplicateProvider {
            existing,
            attempted,
            reason,
            ..
        } => {
            assert_eq!(existing, "PrimaryDb");
            assert_eq!(attempted, "ReplicaDb");
            assert_eq!(reason, DuplicateReason::DifferentUnit);
        }
        other => panic!("unexpected error: {}", other),
    }

    // 不同作用域可以各自提供同一个键
    let child = ctx.add_child(root, "child").unwrap();
    let c = ctx.add_bean(child, "ChildDb").unwrap();
    assert!(ctx.provide(c, key("Db"), true).is_ok());
}

#[test]
fn test_sibling_exports_of_same_key_conflict_at_parent() {
    let (mut ctx, web, jobs) = two_children();
    let web_clock = ctx.add_bean(web, "WebClock").unwrap();
    let job_clock = ctx.add_bean(jobs, "JobClock").unwrap();

    let p1 = ctx.provide(web_clock, key("Clock"), true).unwrap();
    let p2 = ctx.provide(job_clock, key("Clock"), true).unwrap();
    ctx.export(p1).unwrap();
    ctx.export(p2).unwrap();

    let err = ctx.resolve().unwrap_err();
    match err {
        WireError::DuplicateProvider {
            scope,
            existing,
            attempted,
            ..
        } => {
            assert_eq!(scope, "app");
            assert_eq!(existing, "WebClock");
            assert_eq!(attempted, "JobClock");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_duplicate_export_in_one_scope() {
    let (mut ctx, web, _) = two_children();
    let api = ctx.add_bean(web, "Api").unwrap();
    let provider = ctx.provide(api, key("Api"), true).unwrap();

    ctx.export(provider).unwrap();
    assert!(matches!(
        ctx.export_key(web, key("Api")),
        Err(WireError::DuplicateExport { .. })
    ));
}

#[test]
fn test_child_export_is_visible_to_siblings() {
    let (mut ctx, web, jobs) = two_children();
    let scheduler = ctx.add_bean(jobs, "Scheduler").unwrap();
    let provider = ctx.provide(scheduler, key("Scheduler"), true).unwrap();
    ctx.export_key(jobs, key("Scheduler")).unwrap();

    let admin = ctx.add_bean(web, "AdminPage").unwrap();
    let binding = ctx.bind(admin, key("Scheduler"), true).unwrap();

    let app = ctx.build().unwrap();
    assert_eq!(app.resolved_provider_of(binding).unwrap().id(), provider);
    assert_eq!(app.services().get(&key("Scheduler")), None);
}

#[test]
fn test_unexported_services_stay_private() {
    let (mut ctx, web, jobs) = two_children();
    let private = ctx.add_bean(jobs, "Worker").unwrap();
    ctx.provide(private, key("Worker"), true).unwrap();

    let page = ctx.add_bean(web, "Page").unwrap();
    ctx.bind(page, key("Worker"), true).unwrap();

    match ctx.build().unwrap_err() {
        WireError::UnsatisfiedDependency { key: missing, scope, sites } => {
            assert_eq!(missing, key("Worker"));
            assert_eq!(scope, "web");
            assert_eq!(sites, vec!["Page".to_string()]);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_unsatisfied_required_vs_optional() {
    let mut required = BuildContext::new("app");
    let root = required.root();
    let repo = required.add_bean(root, "Repo").unwrap();
    required.bind(repo, key("Cache"), true).unwrap();
    assert!(matches!(
        required.build(),
        Err(WireError::UnsatisfiedDependency { .. })
    ));

    let mut optional = BuildContext::new("app");
    let root = optional.root();
    let repo = optional.add_bean(root, "Repo").unwrap();
    let binding = optional.bind(repo, key("Cache"), false).unwrap();
    let app = optional.build().unwrap();
    assert!(app.resolved_provider_of(binding).is_none());
    assert_eq!(app.stats().unresolved_optional, 1);
    assert_eq!(app.stats().unresolved_required, 0);
}

#[test]
fn test_verify_before_build_reports_every_site() {
    let mut ctx = BuildContext::new("app");
    let root = ctx.root();
    let a = ctx.add_bean(root, "A").unwrap();
    let b = ctx.add_bean(root, "B").unwrap();
    let run = ctx.add_operation(b, "run").unwrap();
    ctx.bind(a, key("Clock"), true).unwrap();
    ctx.bind(run, key("Clock"), true).unwrap();
    ctx.resolve().unwrap();

    let err = ctx.verify(root).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unsatisfied dependency on Clock in scope 'app', required by: A, B#run"
    );
}

#[test]
fn test_export_masking_keeps_own_provider() {
    // parent 自己提供 K；child 也提供 K 并向上导出，同时 child 需要 K。
    // child 的需求必须落在自己的提供者上，而不是绕回父作用域。
    let mut ctx = BuildContext::new("app");
    let root = ctx.root();
    let child = ctx.add_child(root, "child").unwrap();
    let grandchild = ctx.add_child(child, "grandchild").unwrap();

    let parent_bean = ctx.add_bean(root, "ParentK").unwrap();
    let parent_k = ctx.provide(parent_bean, key("K"), true).unwrap();
    let parent_user = ctx.add_bean(root, "ParentUser").unwrap();
    let parent_binding = ctx.bind(parent_user, key("K"), true).unwrap();

    let child_bean = ctx.add_bean(child, "ChildK").unwrap();
    let child_k = ctx.provide(child_bean, key("K"), true).unwrap();
    ctx.export_key(child, key("K")).unwrap();
    let child_user = ctx.add_bean(child, "ChildUser").unwrap();
    let child_binding = ctx.bind(child_user, key("K"), true).unwrap();

    let nested = ctx.add_bean(grandchild, "Nested").unwrap();
    let nested_binding = ctx.bind(nested, key("K"), true).unwrap();

    let stats = ctx.resolve().unwrap();
    assert_eq!(stats.masked, 1);

    let child_node = ctx.scope(child).unwrap();
    assert!(!child_node.visible_services().contains_key(&key("K")));

    let app = ctx.build().unwrap();
    assert_eq!(app.resolved_provider_of(child_binding).unwrap().id(), child_k);
    assert_eq!(app.resolved_provider_of(parent_binding).unwrap().id(), parent_k);
    assert_eq!(app.resolved_provider_of(nested_binding).unwrap().id(), child_k);
}

#[test]
fn test_reexport_of_grandchild_service() {
    let mut ctx = BuildContext::new("app");
    let root = ctx.root();
    let web = ctx.add_child(root, "web").unwrap();
    let auth = ctx.add_child(web, "auth").unwrap();

    let tokens = ctx.add_bean(auth, "TokenService").unwrap();
    let provider = ctx.provide(tokens, key("Tokens"), true).unwrap();
    ctx.export_key(auth, key("Tokens")).unwrap();
    ctx.export_key(web, key("Tokens")).unwrap();

    let app = ctx.build().unwrap();
    assert_eq!(app.services().len(), 0);
    let web_node = app.scope(web).unwrap();
    assert_eq!(web_node.exported_services().get(&key("Tokens")), Some(&provider));
    assert_eq!(
        app.scope(root).unwrap().resolved_services().get(&key("Tokens")),
        Some(&provider)
    );
}

#[test]
fn test_export_of_missing_key_names_scope_path() {
    let mut ctx = BuildContext::new("app");
    let web = ctx.add_child(ctx.root(), "web").unwrap();
    ctx.export_key(web, key("Api")).unwrap();

    match ctx.resolve().unwrap_err() {
        WireError::UnsatisfiedDependency { sites, .. } => {
            assert_eq!(sites, vec!["export of scope app/web".to_string()]);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_cycle_across_two_scopes() {
    let (mut ctx, web, jobs) = two_children();
    let a = ctx.add_bean(web, "A").unwrap();
    let b = ctx.add_bean(jobs, "B").unwrap();

    ctx.provide(a, key("K1"), true).unwrap();
    ctx.bind(a, key("K2"), true).unwrap();
    ctx.export_key(web, key("K1")).unwrap();

    ctx.provide(b, key("K2"), true).unwrap();
    ctx.bind(b, key("K1"), true).unwrap();
    ctx.export_key(jobs, key("K2")).unwrap();

    let err = ctx.build().unwrap_err();
    assert!(matches!(err, WireError::CircularDependency { .. }));
    assert_eq!(err.to_string(), "Circular dependency detected: K1 <-> K2");
}

#[test]
fn test_operation_depending_on_its_own_output_is_a_cycle() {
    let mut ctx = BuildContext::new("app");
    let root = ctx.root();
    let factory = ctx.add_bean(root, "Factory").unwrap();
    let create = ctx.add_operation(factory, "create").unwrap();
    ctx.provide(create, key("Conn"), false).unwrap();
    ctx.bind(create, key("Conn"), true).unwrap();

    let err = ctx.build().unwrap_err();
    assert_eq!(err.to_string(), "Circular dependency detected: Conn -> Conn");
}

#[test]
fn test_precedence_is_configurable_per_binding() {
    let mut ctx = BuildContext::new("app");
    let root = ctx.root();
    let handler = ctx.add_bean(root, "Handler").unwrap();
    let global = ctx.add_bean(root, "GlobalLocale").unwrap();
    let request = ctx.add_bean(root, "RequestLocale").unwrap();

    let global_provider = ctx.provide(global, key("Locale"), true).unwrap();
    let request_provider = ctx
        .provide_at_unit(handler, key("Locale"), request, false)
        .unwrap();

    let default = ctx.bind(handler, key("Locale"), true).unwrap();
    let namespace_first = ctx
        .bind_with(
            handler,
            key("Locale"),
            true,
            Precedence::new([BindingLevel::Namespace, BindingLevel::Unit]),
        )
        .unwrap();

    let app = ctx.build().unwrap();
    assert_eq!(app.resolved_provider_of(default).unwrap().id(), request_provider);
    assert_eq!(app.resolution_of(default).unwrap().level, BindingLevel::Unit);
    assert_eq!(
        app.resolved_provider_of(namespace_first).unwrap().id(),
        global_provider
    );
}

#[test]
fn test_invalid_scope_links() {
    let mut ctx = BuildContext::new("app");
    let root = ctx.root();
    let web = ctx.add_child(root, "web").unwrap();
    let detached = ctx.add_scope("detached").unwrap();

    assert!(matches!(
        ctx.attach_child(web, root),
        Err(WireError::InvalidScopeLink { .. })
    ));
    assert!(matches!(
        ctx.attach_child(detached, web),
        Err(WireError::InvalidScopeLink { .. })
    ));

    // 游离作用域中的必需绑定不能被悄悄跳过
    let bean = ctx.add_bean(detached, "Orphan").unwrap();
    ctx.bind(bean, key("Missing"), true).unwrap();
    match ctx.build().unwrap_err() {
        WireError::InvalidScopeLink { parent, child, .. } => {
            assert_eq!(parent, "app");
            assert_eq!(child, "detached");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_attaching_a_scope_later_makes_it_buildable() {
    let mut ctx = BuildContext::new("app");
    let root = ctx.root();
    let db = ctx.add_bean(root, "Database").unwrap();
    ctx.provide(db, key("Db"), true).unwrap();

    let late = ctx.add_scope("late").unwrap();
    let repo = ctx.add_bean(late, "Repo").unwrap();
    let binding = ctx.bind(repo, key("Db"), true).unwrap();
    ctx.attach_child(root, late).unwrap();

    let app = ctx.build().unwrap();
    assert_eq!(app.resolved_provider_of(binding).unwrap().site(), "Database");
}

/// 长度为 `len` 的依赖链：Link{i} 提供 K{i} 并依赖 K{i+1}
fn provider_chain(len: usize) -> (BuildContext, Vec<UnitId>) {
    let mut ctx = BuildContext::new("app");
    let root = ctx.root();
    let mut links = Vec::with_capacity(len);
    for i in 0..len {
        let link = ctx.add_bean(root, format!("Link{}", i)).unwrap();
        ctx.provide(link, key(&format!("K{}", i)), true).unwrap();
        if i + 1 < len {
            ctx.bind(link, key(&format!("K{}", i + 1)), true).unwrap();
        }
        links.push(link);
    }
    (ctx, links)
}

#[test]
fn test_long_dependency_chain() {
    let len = 10_000;
    let (ctx, _) = provider_chain(len);
    let app = ctx.build().unwrap();
    assert_eq!(app.providers().count(), len);
    assert_eq!(app.stats().unresolved_required, 0);
}

#[test]
fn test_long_dependency_cycle() {
    let len = 10_000;
    let (mut ctx, links) = provider_chain(len);
    ctx.bind(links[len - 1], key("K0"), true).unwrap();

    match ctx.build().unwrap_err() {
        WireError::CircularDependency { chain } => {
            assert_eq!(chain.len(), len);
            assert_eq!(chain[0], key("K0"));
            assert_eq!(chain[len - 1], key(&format!("K{}", len - 1)));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_deeply_nested_scopes() {
    let depth = 1_000;
    let mut ctx = BuildContext::new("app");
    let root = ctx.root();
    let shared = ctx.add_bean(root, "Shared").unwrap();
    ctx.provide(shared, key("Shared"), true).unwrap();

    let mut scope = root;
    for i in 0..depth {
        scope = ctx.add_child(scope, format!("level{}", i)).unwrap();
        let layer = ctx.add_bean(scope, format!("Layer{}", i)).unwrap();
        ctx.bind(layer, key("Shared"), true).unwrap();
    }
    let deepest = scope;

    let app = ctx.build().unwrap();
    let order = app.tree().post_order(app.root());
    assert_eq!(order.len(), depth + 1);
    assert_eq!(order.first(), Some(&deepest));
    assert_eq!(order.last(), Some(&app.root()));

    let report = app.report();
    let mut nested = &report;
    let mut levels = 0;
    while let Some(child) = nested.children.first() {
        nested = child;
        levels += 1;
    }
    assert_eq!(levels, depth);
    assert!(nested.path.ends_with(&format!("level{}", depth - 1)));

    let text = report.to_string();
    assert!(text.starts_with("scope app\n"));
    assert_eq!(text.matches("requires Shared").count(), depth);
}
