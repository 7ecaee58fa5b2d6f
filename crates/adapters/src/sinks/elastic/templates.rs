//! Index templates installed at sink init.
//!
//! Two templates cover the `<database>-*` index pattern: field mappings
//! for the document shape, and shard/replica settings. Kept separate so
//! operators can override sizing without touching mappings.

use serde_json::{Value, json};

pub fn mappings_template_name(database: &str) -> String {
    format!("conntracct_mappings.{database}")
}

pub fn settings_template_name(database: &str) -> String {
    format!("conntracct_settings.{database}")
}

/// Field mappings for exported documents.
///
/// `start`/`timestamp` use millisecond date resolution: nanosecond unix
/// timestamps cannot be ingested as dates.
pub fn mappings_template(database: &str) -> Value {
    json!({
        "index_patterns": [format!("{database}-*")],
        "order": 0,
        "mappings": {
            "properties": {
                "bytes_orig": { "type": "long" },
                "bytes_ret": { "type": "long" },
                "bytes_total": { "type": "long" },
                "packets_orig": { "type": "long" },
                "packets_ret": { "type": "long" },
                "packets_total": { "type": "long" },
                "flow_id": { "type": "keyword" },
                "connmark": { "type": "integer" },
                "src_addr": { "type": "ip" },
                "src_port": { "type": "integer" },
                "dst_addr": { "type": "ip" },
                "dst_port": { "type": "integer" },
                "netns": { "type": "long" },
                "start": { "type": "date" },
                "timestamp": { "type": "date" }
            }
        }
    })
}

/// Shard and replica configuration for exported indices.
pub fn settings_template(database: &str, shards: u16, replicas: u16) -> Value {
    json!({
        "index_patterns": [format!("{database}-*")],
        "order": 0,
        "settings": {
            "number_of_shards": shards,
            "number_of_replicas": replicas
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_names_carry_the_database() {
        assert_eq!(mappings_template_name("flows"), "conntracct_mappings.flows");
        assert_eq!(settings_template_name("flows"), "conntracct_settings.flows");
    }

    #[test]
    fn mappings_cover_the_document_fields() {
        let t = mappings_template("flows");
        assert_eq!(t["index_patterns"][0], "flows-*");
        let props = &t["mappings"]["properties"];
        assert_eq!(props["flow_id"]["type"], "keyword");
        assert_eq!(props["src_addr"]["type"], "ip");
        assert_eq!(props["start"]["type"], "date");
        assert_eq!(props["bytes_total"]["type"], "long");
        assert_eq!(props["dst_port"]["type"], "integer");
    }

    #[test]
    fn settings_carry_shards_and_replicas() {
        let t = settings_template("flows", 3, 2);
        assert_eq!(t["settings"]["number_of_shards"], 3);
        assert_eq!(t["settings"]["number_of_replicas"], 2);
    }
}
