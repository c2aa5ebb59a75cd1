use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum SnapshotStoreType {
    Memory,
    Filesystem { base_dir: String, filename: String },
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct SnapshotStore {
    #[serde(flatten)]
    pub r#type: SnapshotStoreType,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        SnapshotStore {
            r#type: SnapshotStoreType::Memory,
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    #[serde(default)]
    pub snapshot_store: SnapshotStore,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.listener.host, "127.0.0.1");
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.snapshot_store.r#type, SnapshotStoreType::Memory);
    }

    #[test]
    fn parse_filesystem_snapshot_store() {
        let yaml = r#"
            listener:
                host: 0.0.0.0
                port: 9000
            snapshot_store:
                type: filesystem
                base_dir: /var/lib/bucketd/
                filename: registry.bin
            "#;
        let config: Config = serde_yaml::from_str(yaml).expect("parse config");
        assert_eq!(config.listener.port, 9000);
        assert_eq!(
            config.snapshot_store.r#type,
            SnapshotStoreType::Filesystem {
                base_dir: "/var/lib/bucketd/".into(),
                filename: "registry.bin".into(),
            }
        );
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: Config = serde_yaml::from_str("listener: {host: 0.0.0.0, port: 8081}")
            .expect("parse config");
        assert_eq!(config.snapshot_store, SnapshotStore::default());
    }
}
