// ABOUTME: Property tests for compose port detection.
// ABOUTME: Generated port entries must come back with the ports they were built from.

use archon_agent::compose::{PortProtocol, parse_ports, render_override};
use archon_agent::site::{DeployRequest, DomainMapping};
use archon_agent::types::SiteId;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn document(entries: &[String]) -> String {
    let mut doc = String::from("services:\n  web:\n    image: nginx\n    ports:\n");
    for entry in entries {
        doc.push_str(&format!("      - \"{entry}\"\n"));
    }
    doc
}

proptest! {
    #[test]
    fn short_syntax_round_trips(host in 1u16.., container in 1u16.., udp in any::<bool>()) {
        let suffix = if udp { "/udp" } else { "" };
        let ports = parse_ports(&document(&[format!("{host}:{container}{suffix}")])).unwrap();
        prop_assert_eq!(ports.len(), 1);
        prop_assert_eq!(ports[0].host_port, host);
        prop_assert_eq!(ports[0].container_port, container);
        let expected = if udp { PortProtocol::Udp } else { PortProtocol::Tcp };
        prop_assert_eq!(ports[0].protocol, expected);
    }

    #[test]
    fn bound_address_is_ignored(a in 0u8.., b in 0u8.., host in 1u16.., container in 1u16..) {
        let entry = format!("{a}.0.0.{b}:{host}:{container}");
        let ports = parse_ports(&document(&[entry])).unwrap();
        prop_assert_eq!(ports.len(), 1);
        prop_assert_eq!((ports[0].host_port, ports[0].container_port), (host, container));
    }

    #[test]
    fn entry_order_is_preserved(containers in prop::collection::vec(1u16.., 1..8)) {
        let entries: Vec<String> = containers.iter().map(u16::to_string).collect();
        let ports = parse_ports(&document(&entries)).unwrap();
        let parsed: Vec<u16> = ports.iter().map(|p| p.container_port).collect();
        prop_assert_eq!(parsed, containers);
        prop_assert!(ports.iter().all(|p| p.host_port == 0));
    }

    #[test]
    fn arbitrary_text_never_panics(entry in "[0-9a-z:./-]{0,24}") {
        let _ = parse_ports(&document(&[entry]));
    }
}

#[test]
fn override_labels_only_routed_services() {
    let doc = "services:\n  web:\n    ports:\n      - \"8080:80\"\n  db:\n    image: postgres\n";
    let request = DeployRequest::compose(SiteId::new(), "shop", doc)
        .with_domain(DomainMapping::new("shop.example.com", 80));
    let routing = BTreeMap::from([("traefik.enable".to_string(), "true".to_string())]);

    let rendered = render_override(&request, &routing).unwrap();
    let value: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();

    let web = &value["services"]["web"]["labels"];
    let db = &value["services"]["db"]["labels"];
    assert_eq!(web["traefik.enable"].as_str(), Some("true"));
    assert_eq!(web["archon.managed"].as_str(), Some("true"));
    assert!(db.get("traefik.enable").is_none());
    assert_eq!(db["archon.site.id"].as_str(), Some(request.id.to_string().as_str()));
}
