//! YAML layout of the topic catalog

use serde::{Deserialize, Serialize};

/// Root of a catalog file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub kafka: KafkaSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KafkaSection {
    #[serde(rename = "topicsGroups", default)]
    pub topics_groups: Vec<TopicsGroup>,
}

/// Topics sharing one configuration key prefix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicsGroup {
    pub path: String,
    #[serde(default)]
    pub topics: Vec<TopicEntry>,
}

/// Logical topic name plus its fallback concrete name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicEntry {
    pub name: String,
    #[serde(default)]
    pub default_value: Option<String>,
}

impl TopicsGroup {
    /// Configuration key holding the override for `entry`
    pub fn key_for(&self, entry: &TopicEntry) -> String {
        format!("{}/{}", self.path, entry.name)
    }
}

impl CatalogDocument {
    /// Every entry with its override key, in file order
    pub fn entries(&self) -> impl Iterator<Item = (String, &TopicEntry)> + '_ {
        self.kafka
            .topics_groups
            .iter()
            .flat_map(|group| group.topics.iter().map(move |entry| (group.key_for(entry), entry)))
    }

    /// First entry with the given logical name
    pub fn find(&self, name: &str) -> Option<(String, &TopicEntry)> {
        self.entries().find(|(_, entry)| entry.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
kafka:
  topicsGroups:
    - path: app/topics
      topics:
        - name: results
          default_value: results.v1
        - name: email.send
    - path: other/topics
      topics:
        - name: results
          default_value: shadowed
"#;

    #[test]
    fn test_parse_and_walk_entries() {
        let doc: CatalogDocument = serde_yaml::from_str(SAMPLE).unwrap();
        let keys: Vec<String> = doc.entries().map(|(key, _)| key).collect();
        assert_eq!(
            keys,
            vec!["app/topics/results", "app/topics/email.send", "other/topics/results"]
        );
        assert_eq!(doc.kafka.topics_groups[0].topics[1].default_value, None);
    }

    #[test]
    fn test_find_returns_first_match() {
        let doc: CatalogDocument = serde_yaml::from_str(SAMPLE).unwrap();
        let (key, entry) = doc.find("results").unwrap();
        assert_eq!(key, "app/topics/results");
        assert_eq!(entry.default_value.as_deref(), Some("results.v1"));
        assert!(doc.find("missing").is_none());
    }
}
