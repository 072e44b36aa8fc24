use std::{collections::BTreeMap, time::Duration};

const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialCacheConfig {
    /// When disabled every request executes the original document.
    pub enabled: bool,
    /// The ttl to store responses with. Defaults to 60s
    #[serde(deserialize_with = "duration_str::deserialize_option_duration")]
    pub ttl: Option<Duration>,
    /// When the partial query plan gets computed.
    pub strategy: StrategyKind,
    /// Attach the cache metadata block to returned responses under `extensions.cache`.
    pub include_extension_metadata: bool,
    /// Fields used as the entity id when a selection set has no `@idField` directive.
    pub id_fields: Vec<String>,
    /// Per entity type settings, keyed by typename.
    pub entities: BTreeMap<String, EntityConfig>,
}

impl Default for PartialCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: None,
            strategy: StrategyKind::default(),
            include_extension_metadata: false,
            id_fields: Vec::new(),
            entities: BTreeMap::new(),
        }
    }
}

impl PartialCacheConfig {
    pub fn ttl(&self) -> Duration {
        self.ttl.unwrap_or(DEFAULT_TTL)
    }

    pub fn entity_ttls(&self) -> BTreeMap<String, Duration> {
        self.entities
            .iter()
            .filter_map(|(typename, entity)| Some((typename.clone(), entity.ttl?)))
            .collect()
    }

    pub fn resolvers(&self) -> BTreeMap<String, ResolverConfig> {
        self.entities
            .iter()
            .filter_map(|(typename, entity)| Some((typename.clone(), entity.resolver.clone()?)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Eager,
    #[default]
    Lazy,
}

#[derive(Debug, Default, Clone, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EntityConfig {
    #[serde(deserialize_with = "duration_str::deserialize_option_duration")]
    pub ttl: Option<Duration>,
    pub resolver: Option<ResolverConfig>,
}

/// A root field able to fetch one entity type by id.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    pub root_field: String,
    #[serde(default = "default_id_arg")]
    pub id_arg: String,
    #[serde(default, rename = "type")]
    pub id_type: IdType,
    /// Fetch all ids with a single list argument instead of one field per id.
    #[serde(default)]
    pub batch: bool,
}

fn default_id_arg() -> String {
    String::from("id")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdType {
    #[default]
    String,
    Int,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use indoc::indoc;

    use super::*;

    #[test]
    fn defaults() {
        let config: PartialCacheConfig = toml::from_str("").unwrap();

        insta::assert_debug_snapshot!(config, @r###"
        PartialCacheConfig {
            enabled: true,
            ttl: None,
            strategy: Lazy,
            include_extension_metadata: false,
            id_fields: [],
            entities: {},
        }
        "###);
        assert_eq!(config.ttl(), Duration::from_secs(60));
    }

    #[test]
    fn entities() {
        let input = indoc! {r#"
            ttl = "5m"
            strategy = "eager"
            id_fields = ["id"]

            [entities.UpdateInfo]
            ttl = "30s"

            [entities.UpdateInfo.resolver]
            root_field = "getUpdateInfo"
            type = "int"
            batch = true

            [entities.User.resolver]
            root_field = "user"
            id_arg = "userId"
        "#};

        let config: PartialCacheConfig = toml::from_str(input).unwrap();

        assert_eq!(config.ttl(), Duration::from_secs(300));
        assert_eq!(config.strategy, StrategyKind::Eager);
        assert_eq!(config.id_fields, vec!["id".to_string()]);
        assert_eq!(
            config.entity_ttls(),
            BTreeMap::from([("UpdateInfo".to_string(), Duration::from_secs(30))])
        );

        let resolvers = config.resolvers();
        assert_eq!(
            resolvers.get("UpdateInfo"),
            Some(&ResolverConfig {
                root_field: "getUpdateInfo".into(),
                id_arg: "id".into(),
                id_type: IdType::Int,
                batch: true,
            })
        );
        assert_eq!(
            resolvers.get("User"),
            Some(&ResolverConfig {
                root_field: "user".into(),
                id_arg: "userId".into(),
                id_type: IdType::String,
                batch: false,
            })
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let input = indoc! {r#"
            [entities.User]
            time_to_live = "30s"
        "#};

        assert!(toml::from_str::<PartialCacheConfig>(input).is_err());
    }
}
