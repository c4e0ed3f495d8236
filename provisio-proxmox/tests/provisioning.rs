//! End-to-end provisioning scenarios against the mock hypervisor API.

use provisio_proxmox::{
    Method, MockApi, MemoryStore, ProvisionError, ProxmoxExtension, ServiceRecord, ServiceRef,
    ServiceStatus, ServiceStore, SettingsBag, PROP_IP, PROP_VMID,
};
use serde_json::json;

fn bag(pairs: &[(&str, &str)]) -> SettingsBag {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn container_product() -> SettingsBag {
    bag(&[
        ("type", "lxc"),
        ("node", "pve1"),
        ("storage", "local"),
        ("cores", "2"),
        ("memory", "1024"),
        ("disk", "10"),
        ("template", "local:vztmpl/debian.tar.gz"),
        ("bridge", "vmbr0"),
    ])
}

fn checkout() -> SettingsBag {
    bag(&[("hostname", "host1"), ("password", "  pa ss  ")])
}

/// Container creation issues exactly one create call carrying the allocated id.
#[tokio::test]
async fn test_container_creation_scenario() {
    let api = MockApi::new();
    api.reply(Method::Get, "/cluster/nextid", json!("105"));
    let extension = ProxmoxExtension::new(api, MemoryStore::new());
    let service = ServiceRef::new(1, 1);

    let vmid = extension.create(service, &container_product(), &checkout()).await.unwrap();
    assert_eq!(vmid, 105);

    let creates = extension.api().requests_with(Method::Post);
    assert_eq!(creates.len(), 1);
    let create = &creates[0];
    assert_eq!(create.path, "/nodes/pve1/lxc");
    assert_eq!(create.param("vmid"), Some(&json!(105)));
    assert_eq!(create.param("cores"), Some(&json!(2)));
    assert_eq!(create.param("memory"), Some(&json!(1024)));
    assert_eq!(create.param("ostemplate"), Some(&json!("local:vztmpl/debian.tar.gz")));
    assert_eq!(create.param("hostname"), Some(&json!("host1")));
    assert_eq!(create.param("password"), Some(&json!("  pa ss  ")));
    assert_eq!(create.param("swap"), Some(&json!(512)));
    assert_eq!(create.param("net0"), Some(&json!("name=eth0,bridge=vmbr0,firewall=0")));

    let tracked = extension.store().property(service, PROP_VMID).await.unwrap();
    assert_eq!(tracked.as_deref(), Some("105"));
}

/// A failed create still leaves the allocated id on the service.
#[tokio::test]
async fn test_failed_create_keeps_traceable_vmid() {
    let api = MockApi::new();
    api.reply(Method::Get, "/cluster/nextid", json!("106"))
        .fail(Method::Post, "/nodes/pve1/lxc", 500, r#"{"errors":{"ostemplate":"no such volume"}}"#);
    let extension = ProxmoxExtension::new(api, MemoryStore::new());
    let service = ServiceRef::new(2, 1);

    let err = extension.create(service, &container_product(), &checkout()).await.unwrap_err();
    match err {
        ProvisionError::Api { status, body, .. } => {
            assert_eq!(status, 500);
            assert!(body.contains("no such volume"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let tracked = extension.store().property(service, PROP_VMID).await.unwrap();
    assert_eq!(tracked.as_deref(), Some("106"));
}

/// Addresses held by live services of the same product are skipped.
#[tokio::test]
async fn test_sequential_containers_get_distinct_addresses() {
    let api = MockApi::new();
    let store = MemoryStore::new();
    let mut product = container_product();
    product.insert("ips".into(), "10.0.0.5,10.0.0.6".into());
    product.insert("gateway".into(), "10.0.0.1".into());

    let mut first = ServiceRecord::new(1, 1);
    first.status = ServiceStatus::Active;
    store.insert(first);
    let mut second = ServiceRecord::new(2, 1);
    second.status = ServiceStatus::Active;
    store.insert(second);
    store.insert(ServiceRecord::new(3, 1));

    api.reply(Method::Get, "/cluster/nextid", json!("200"));
    let extension = ProxmoxExtension::new(api, store);

    extension.create(ServiceRef::new(1, 1), &product, &checkout()).await.unwrap();
    extension.create(ServiceRef::new(2, 1), &product, &checkout()).await.unwrap();

    let nets: Vec<_> = extension
        .api()
        .requests_with(Method::Post)
        .iter()
        .map(|r| r.param("net0").cloned().unwrap())
        .collect();
    assert_eq!(
        nets,
        vec![
            json!("name=eth0,bridge=vmbr0,firewall=0,ip=10.0.0.5/24,gw=10.0.0.1"),
            json!("name=eth0,bridge=vmbr0,firewall=0,ip=10.0.0.6/24,gw=10.0.0.1"),
        ]
    );

    let err = extension
        .create(ServiceRef::new(3, 1), &product, &checkout())
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::AddressesExhausted(1)));
    assert_eq!(extension.api().requests_with(Method::Post).len(), 2);
}

/// Terminate on guest 137: stop, then purge delete, then clear, even when stop fails.
#[tokio::test]
async fn test_terminate_scenario() {
    let api = MockApi::new();
    api.fail(Method::Post, "/nodes/pve1/lxc/137/status/stop", 500, "CT 137 not running");
    let store = MemoryStore::new();
    let service = ServiceRef::new(9, 1);
    store.set_property(service, PROP_VMID, "137").await.unwrap();
    store.set_property(service, PROP_IP, "10.0.0.5").await.unwrap();
    let extension = ProxmoxExtension::new(api, store);

    extension.terminate(service, &container_product()).await.unwrap();

    assert_eq!(
        extension.api().call_log(),
        vec!["POST /nodes/pve1/lxc/137/status/stop", "DELETE /nodes/pve1/lxc/137"]
    );
    let delete = extension.api().requests().pop().unwrap();
    assert_eq!(delete.param("purge"), Some(&json!(1)));
    assert_eq!(delete.param("destroy-unreferenced-disks"), Some(&json!(1)));

    assert_eq!(extension.store().property(service, PROP_VMID).await.unwrap(), None);
    assert!(extension.available_actions(service).await.unwrap().is_empty());
}

/// VM creation: disk slot keyed by bus, CD-ROM on ide2, agent enabled.
#[tokio::test]
async fn test_vm_creation_scenario() {
    let api = MockApi::new();
    api.reply(Method::Get, "/cluster/nextid", json!(300));
    let extension = ProxmoxExtension::new(api, MemoryStore::new());

    let product = bag(&[
        ("type", "qemu"),
        ("node", "pve2"),
        ("storage", "ceph"),
        ("disk", "50"),
        ("storage_type", "virtio"),
        ("storage_format", "raw"),
        ("model", "e1000"),
        ("firewall", "true"),
        ("os", "local:iso/debian-12.iso"),
        ("sockets", "2"),
    ]);

    let vmid = extension
        .create(ServiceRef::new(1, 1), &product, &checkout())
        .await
        .unwrap();
    assert_eq!(vmid, 300);

    let create = extension.api().requests_with(Method::Post).pop().unwrap();
    assert_eq!(create.path, "/nodes/pve2/qemu");
    assert_eq!(create.param("virtio0"), Some(&json!("ceph:50,format=raw")));
    assert_eq!(create.param("ide2"), Some(&json!("local:iso/debian-12.iso,media=cdrom")));
    assert_eq!(create.param("net0"), Some(&json!("e1000,bridge=vmbr0,firewall=1")));
    assert_eq!(create.param("sockets"), Some(&json!(2)));
    assert_eq!(create.param("agent"), Some(&json!(1)));
    assert_eq!(create.param("name"), Some(&json!("host1")));
}

/// Schema reads fail as a whole when one discovery query has no data.
#[tokio::test]
async fn test_config_schema_requires_complete_topology() {
    let api = MockApi::new();
    api.reply(Method::Get, "/nodes", json!([{"node": "pve1"}]))
        .reply(Method::Get, "/nodes/pve1/storage", json!([{"storage": "local"}]))
        .reply(Method::Get, "/pools", json!([]))
        .reply(Method::Get, "/nodes/pve1/storage/local/content", json!([]))
        .reply(Method::Get, "/nodes/pve1/network", json!([{"iface": "vmbr0", "active": 1}]));
    let extension = ProxmoxExtension::new(api, MemoryStore::new());

    let err = extension.config_schema(None).await.unwrap_err();
    assert!(matches!(err, ProvisionError::TopologyUnavailable(_)));

    extension
        .api()
        .reply(Method::Get, "/nodes/pve1/capabilities/qemu/cpu", json!([{"name": "host"}]));
    let fields = extension.config_schema(None).await.unwrap();
    let cpu = fields.iter().find(|f| f.name == "cpu").unwrap();
    assert_eq!(
        serde_json::to_value(cpu).unwrap()["options"],
        json!(["host"])
    );
}
