use pretty_assertions::assert_eq;
use stevedore::runtime::FakeRuntime;
use stevedore::{ComposeAction, Stevedore, StevedoreError};

const DEFINITION: &str = r#"
services:
  web:
    image: x/web
    ports:
      - "8080:80"
    environment:
      FOO: bar
  worker:
    image: x/worker
    command: run --once
networks:
  backend:
    driver: bridge
"#;

fn fleet() -> Stevedore<FakeRuntime> {
    Stevedore::with_runtime(FakeRuntime::new())
}

fn calls_of(fleet: &Stevedore<FakeRuntime>) -> Vec<(String, String)> {
    fleet.runtime().calls()
}

#[tokio::test]
async fn up_processes_networks_before_containers_in_declaration_order() {
    let fleet = fleet();
    fleet
        .reconcile(DEFINITION, "demo", ComposeAction::Up)
        .await
        .unwrap();

    let expected: Vec<(String, String)> = [
        ("find_network_by_name", "demo_backend"),
        ("create_network", "demo_backend"),
        ("find_container_by_name", "demo_web"),
        ("create_container", "demo_web"),
        ("start_container", "demo_web"),
        ("find_container_by_name", "demo_worker"),
        ("create_container", "demo_worker"),
        ("start_container", "demo_worker"),
    ]
    .iter()
    .map(|(op, target)| (op.to_string(), target.to_string()))
    .collect();
    assert_eq!(calls_of(&fleet), expected);

    assert_eq!(fleet.runtime().network_names(), ["demo_backend"]);
    assert_eq!(
        fleet.runtime().container_names(),
        ["demo_web", "demo_worker"]
    );
    assert_eq!(
        fleet.runtime().container_state("demo_web").as_deref(),
        Some("running")
    );
}

#[tokio::test]
async fn container_spec_is_derived_from_the_service_definition() {
    let fleet = fleet();
    fleet
        .reconcile(DEFINITION, "demo", ComposeAction::Up)
        .await
        .unwrap();

    let spec = fleet.runtime().container_spec("demo_web").unwrap();
    assert_eq!(spec.name, "demo_web");
    assert_eq!(spec.image, "x/web");
    assert_eq!(spec.env, ["FOO=bar"]);
    assert_eq!(spec.exposed_ports, ["80/tcp"]);
    assert_eq!(spec.port_bindings[0].host_port, "8080");
    assert_eq!(spec.port_bindings[0].container_port, "80/tcp");

    let worker = fleet.runtime().container_spec("demo_worker").unwrap();
    assert_eq!(worker.command.as_deref().unwrap(), ["run", "--once"]);
}

#[tokio::test]
async fn up_then_down_restores_the_runtime_to_its_prior_state() {
    let fleet = fleet();
    fleet
        .reconcile(DEFINITION, "demo", ComposeAction::Up)
        .await
        .unwrap();
    fleet
        .reconcile(DEFINITION, "demo", ComposeAction::Down)
        .await
        .unwrap();

    assert!(fleet.runtime().container_names().is_empty());
    assert!(fleet.runtime().network_names().is_empty());
}

#[tokio::test]
async fn down_stops_before_removing_and_handles_services_before_networks() {
    let fleet = fleet();
    fleet
        .reconcile(DEFINITION, "demo", ComposeAction::Up)
        .await
        .unwrap();

    let before = calls_of(&fleet).len();
    fleet
        .reconcile(DEFINITION, "demo", ComposeAction::Down)
        .await
        .unwrap();

    let down_calls: Vec<(String, String)> = calls_of(&fleet)[before..].to_vec();
    let expected: Vec<(String, String)> = [
        ("find_container_by_name", "demo_web"),
        ("stop_container", "demo_web"),
        ("remove_container", "demo_web"),
        ("find_container_by_name", "demo_worker"),
        ("stop_container", "demo_worker"),
        ("remove_container", "demo_worker"),
        ("find_network_by_name", "demo_backend"),
        ("remove_network", "demo_backend"),
    ]
    .iter()
    .map(|(op, target)| (op.to_string(), target.to_string()))
    .collect();
    assert_eq!(down_calls, expected);
}

#[tokio::test]
async fn down_on_an_absent_project_succeeds_with_lookups_only() {
    let fleet = fleet();
    fleet
        .reconcile(DEFINITION, "demo", ComposeAction::Down)
        .await
        .unwrap();

    let calls = calls_of(&fleet);
    assert_eq!(calls.len(), 3);
    assert!(calls
        .iter()
        .all(|(op, _)| op == "find_container_by_name" || op == "find_network_by_name"));
}

#[tokio::test]
async fn a_mid_up_failure_aborts_the_remaining_services() {
    let definition = r#"
services:
  a:
    image: x/a
  b:
    image: x/b
  c:
    image: x/c
"#;
    let fleet = fleet();
    fleet
        .runtime()
        .fail_on("create_container", "p_b", "boom");

    let err = fleet
        .reconcile(definition, "p", ComposeAction::Up)
        .await
        .unwrap_err();

    match err {
        StevedoreError::Runtime(e) => {
            assert_eq!(e.operation, "create_container");
            assert_eq!(e.target, "p_b");
        }
        other => panic!("expected runtime error, got {other}"),
    }

    // The first service went up, the third was never attempted.
    assert_eq!(
        fleet.runtime().container_state("p_a").as_deref(),
        Some("running")
    );
    assert!(!calls_of(&fleet)
        .iter()
        .any(|(op, target)| op == "create_container" && target == "p_c"));
}

#[tokio::test]
async fn a_mid_down_failure_aborts_the_remaining_steps() {
    let definition = r#"
services:
  a:
    image: x/a
  b:
    image: x/b
"#;
    let fleet = fleet();
    fleet
        .reconcile(definition, "p", ComposeAction::Up)
        .await
        .unwrap();

    fleet.runtime().fail_on("stop_container", "p_a", "boom");
    let err = fleet
        .reconcile(definition, "p", ComposeAction::Down)
        .await
        .unwrap_err();
    assert!(matches!(err, StevedoreError::Runtime(_)));

    // The second service was never touched.
    assert!(!calls_of(&fleet)
        .iter()
        .any(|(op, target)| op == "stop_container" && target == "p_b"));
    assert_eq!(
        fleet.runtime().container_names(),
        ["p_a", "p_b"]
    );
}

#[tokio::test]
async fn up_is_idempotent_and_reuses_existing_resources() {
    let fleet = fleet();
    fleet
        .reconcile(DEFINITION, "demo", ComposeAction::Up)
        .await
        .unwrap();
    fleet
        .reconcile(DEFINITION, "demo", ComposeAction::Up)
        .await
        .unwrap();

    assert_eq!(
        fleet.runtime().container_names(),
        ["demo_web", "demo_worker"]
    );
    assert_eq!(fleet.runtime().network_names(), ["demo_backend"]);

    let creates = calls_of(&fleet)
        .iter()
        .filter(|(op, target)| op == "create_container" && target == "demo_web")
        .count();
    assert_eq!(creates, 1);
}

#[tokio::test]
async fn a_parse_error_short_circuits_before_any_runtime_call() {
    let fleet = fleet();
    let err = fleet
        .reconcile("services: [not, a, mapping]", "demo", ComposeAction::Up)
        .await
        .unwrap_err();
    assert!(matches!(err, StevedoreError::Parse(_)));
    assert!(calls_of(&fleet).is_empty());
}

#[tokio::test]
async fn a_custom_ordering_strategy_can_replace_declaration_order() {
    use stevedore::compose::{ComposeProject, NetworkSpec, ServiceSpec};
    use stevedore::reconciler::{Reconciler, StartupOrdering};

    struct ReverseOrder;

    impl StartupOrdering for ReverseOrder {
        fn services<'a>(&self, project: &'a ComposeProject) -> Vec<&'a ServiceSpec> {
            project.services.iter().rev().collect()
        }

        fn networks<'a>(&self, project: &'a ComposeProject) -> Vec<&'a NetworkSpec> {
            project.networks.iter().rev().collect()
        }
    }

    let runtime = FakeRuntime::new();
    let project = ComposeProject::parse("demo", DEFINITION).unwrap();
    Reconciler::with_ordering(&runtime, Box::new(ReverseOrder))
        .up(&project)
        .await
        .unwrap();

    assert_eq!(
        runtime.container_names(),
        ["demo_worker", "demo_web"]
    );
}

#[tokio::test]
async fn projects_are_namespaced_and_do_not_collide() {
    let fleet = fleet();
    fleet
        .reconcile(DEFINITION, "alpha", ComposeAction::Up)
        .await
        .unwrap();
    fleet
        .reconcile(DEFINITION, "beta", ComposeAction::Up)
        .await
        .unwrap();

    let mut names = fleet.runtime().container_names();
    names.sort();
    assert_eq!(names, ["alpha_web", "alpha_worker", "beta_web", "beta_worker"]);

    // Tearing down one project leaves the other untouched.
    fleet
        .reconcile(DEFINITION, "alpha", ComposeAction::Down)
        .await
        .unwrap();
    let mut names = fleet.runtime().container_names();
    names.sort();
    assert_eq!(names, ["beta_web", "beta_worker"]);
    assert_eq!(fleet.runtime().network_names(), ["beta_backend"]);
}
