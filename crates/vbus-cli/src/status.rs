use chrono::Local;
use serde_json::{json, Value};
use vbus_tree::{attr, on_get, Attribute, RawNode};

pub const STATUS_NODE: &str = "status";

/// Current local time, recomputed on every read.
pub fn hour_attribute() -> Attribute {
    attr(
        "hour",
        json!(now()),
        [on_get(|_: &Value, _: &[String]| json!(now()))],
    )
}

pub fn status_node() -> RawNode {
    RawNode::new().attribute(hour_attribute())
}

fn now() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use vbus_registry::{LoopbackTransport, Registry, RegistryConfig};

    #[tokio::test]
    async fn hour_changes_between_reads_and_identity_holds() {
        let transport = Arc::new(LoopbackTransport::default());
        let registry = Registry::shared(RegistryConfig::default(), transport.clone());
        registry.connect().await.unwrap();
        registry.add_node(STATUS_NODE, status_node()).unwrap();

        let before = registry.lookup("status/hour").unwrap();
        let first = transport.read("status.hour").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let second = transport.read("status.hour").await.unwrap();
        let after = registry.lookup("status/hour").unwrap();

        assert_ne!(first, second);
        assert!(before.same_entity(&after));
        assert_eq!(first.as_str().map(str::len), Some(8));

        registry.close().await.unwrap();
    }

    #[test]
    fn schema_is_string() {
        let hour = hour_attribute();
        assert!(hour.has_resolver());
        assert_eq!(hour.schema(), &json!({ "type": "string" }));
    }
}
