// ABOUTME: Integration tests against the local container engine.
// ABOUTME: Skipped when no Docker or Podman socket is present on the host.

use archon_agent::runtime::{
    BollardRuntime, ContainerFilters, ContainerOps, NetworkOps, RuntimeInfo, detect_local,
};

fn local_runtime() -> Option<BollardRuntime> {
    let endpoint = match detect_local() {
        Ok(endpoint) => endpoint,
        Err(e) => {
            eprintln!("skipping: {e}");
            return None;
        }
    };
    Some(BollardRuntime::connect(&endpoint).expect("client should build for a present socket"))
}

#[test_group::group(docker)]
#[tokio::test]
async fn runtime_ping() {
    let Some(runtime) = local_runtime() else {
        return;
    };
    if let Err(e) = runtime.ping().await {
        eprintln!("skipping: engine not answering: {e}");
        return;
    }
}

#[test_group::group(docker)]
#[tokio::test]
async fn runtime_info() {
    let Some(runtime) = local_runtime() else {
        return;
    };
    if runtime.ping().await.is_err() {
        return;
    }

    let info = runtime.info().await.expect("should get runtime info");
    assert!(!info.version.is_empty(), "version should be reported");
    assert!(!info.name.is_empty(), "name should be reported");
}

#[test_group::group(docker)]
#[tokio::test]
async fn unknown_network_does_not_exist() {
    let Some(runtime) = local_runtime() else {
        return;
    };
    if runtime.ping().await.is_err() {
        return;
    }

    let exists = runtime
        .network_exists("archon-test-network-that-does-not-exist")
        .await
        .expect("network lookup should succeed");
    assert!(!exists);
}

#[test_group::group(docker)]
#[tokio::test]
async fn label_filter_matches_nothing_for_unknown_site() {
    let Some(runtime) = local_runtime() else {
        return;
    };
    if runtime.ping().await.is_err() {
        return;
    }

    let filters = ContainerFilters::default()
        .label("archon.site.id", "00000000-0000-0000-0000-000000000000")
        .including_stopped();
    let containers = runtime
        .list_containers(&filters)
        .await
        .expect("listing should succeed");
    assert!(containers.is_empty());
}
