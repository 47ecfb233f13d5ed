//! Backend selection from settings.
//!
//! Settings are an explicit value: a backend name plus one option table per
//! backend. The factory maps names to constructors; `local` and
//! `distributed` are built in and more can be registered. A backend table
//! may carry a `class` key naming the registered constructor to use, which
//! lets one constructor be configured under several names.

use super::{DistributedOptions, DistributedQueue, LocalQueue, RequestQueue};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_BACKEND: &str = "local";

/// Key in a backend table that selects the constructor.
const CLASS_KEY: &str = "class";

/// Which backend to build and with what options.
///
/// TOML layout:
///
/// ```toml
/// [queue]
/// backend = "distributed"
///
/// [queue.backends.distributed]
/// namespace = "crawl"
/// dedupe = true
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueSettings {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub backends: BTreeMap<String, toml::Table>,
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            backends: BTreeMap::new(),
        }
    }
}

impl QueueSettings {
    /// Parse the `[queue]` table of a TOML document. Other top-level tables are ignored.
    pub fn from_toml_str(src: &str) -> Result<Self> {
        let mut doc: toml::Table = src
            .parse()
            .map_err(|e| Error::Config(format!("settings are not valid TOML: {e}")))?;
        match doc.remove("queue") {
            None => Ok(Self::default()),
            Some(value) => value
                .try_into()
                .map_err(|e| Error::Config(format!("[queue]: {e}"))),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)?;
        Self::from_toml_str(&src)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    /// Option table for `backend`, created empty if absent.
    pub fn backend_options_mut(&mut self, backend: &str) -> &mut toml::Table {
        self.backends.entry(normalize(backend)).or_default()
    }

    /// Constructor class of the selected backend and its options minus `class`.
    pub fn resolve(&self) -> Result<(String, toml::Table)> {
        let name = normalize(&self.backend);
        let table = self.backends.get(&name).cloned().unwrap_or_default();
        split_class(&name, table)
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// The `class` key names the constructor; without one the backend name does.
fn split_class(name: &str, mut table: toml::Table) -> Result<(String, toml::Table)> {
    let class = match table.remove(CLASS_KEY) {
        None => name.to_string(),
        Some(toml::Value::String(class)) => normalize(&class),
        Some(other) => {
            return Err(Error::Config(format!(
                "backend {name:?}: `class` must be a string, got {}",
                other.type_str()
            )));
        }
    };
    Ok((class, table))
}

type BoxedQueue = Box<dyn RequestQueue>;
type PendingQueue = Pin<Box<dyn Future<Output = Result<BoxedQueue>> + Send>>;
type Constructor = Arc<dyn Fn(toml::Table) -> PendingQueue + Send + Sync>;

/// Registry of backend constructors.
#[derive(Clone)]
pub struct QueueFactory {
    constructors: BTreeMap<String, Constructor>,
}

impl Default for QueueFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QueueFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueFactory")
            .field("backends", &self.supported())
            .finish()
    }
}

impl QueueFactory {
    /// Factory with the built-in `local` and `distributed` backends.
    pub fn new() -> Self {
        let mut factory = Self::empty();
        factory.register("local", |table| async move { LocalQueue::from_options(table) });
        factory.register("distributed", |table| async move {
            DistributedQueue::connect(DistributedOptions::from_table(table)?).await
        });
        factory
    }

    /// Factory with nothing registered.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Register a constructor under `name`, replacing any previous one.
    ///
    /// The constructor gets the backend's option table (minus `class`).
    pub fn register<Q, F, Fut>(&mut self, name: &str, ctor: F)
    where
        Q: RequestQueue + 'static,
        F: Fn(toml::Table) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Q>> + Send + 'static,
    {
        let ctor: Constructor = Arc::new(move |table: toml::Table| -> PendingQueue {
            let fut = ctor(table);
            Box::pin(async move { fut.await.map(|q| Box::new(q) as BoxedQueue) })
        });
        self.constructors.insert(normalize(name), ctor);
    }

    /// Registered backend names, sorted.
    pub fn supported(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Build the backend named by `settings.backend`.
    pub async fn create(&self, settings: &QueueSettings) -> Result<BoxedQueue> {
        let (class, table) = settings.resolve()?;
        self.build(&normalize(&settings.backend), class, table).await
    }

    /// Build backend `name` from an explicit option table.
    pub async fn create_named(&self, name: &str, table: toml::Table) -> Result<BoxedQueue> {
        let name = normalize(name);
        let (class, table) = split_class(&name, table)?;
        self.build(&name, class, table).await
    }

    async fn build(&self, name: &str, class: String, table: toml::Table) -> Result<BoxedQueue> {
        let ctor = self.constructors.get(&class).ok_or_else(|| {
            Error::Config(format!(
                "unknown queue backend {class:?}; supported: {}",
                self.supported().join(", ")
            ))
        })?;

        let queue = ctor(table).await?;
        info!(backend = %name, class = %class, "queue backend created");
        Ok(queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_to_local() {
        let settings = QueueSettings::from_toml_str("").unwrap();
        assert_eq!(settings.backend, "local");
        assert!(settings.backends.is_empty());
    }

    #[test]
    fn settings_read_queue_table_only() {
        let settings = QueueSettings::from_toml_str(
            r#"
            [logging]
            level = "debug"

            [queue]
            backend = "distributed"

            [queue.backends.distributed]
            namespace = "crawl"
            dedupe = true
            "#,
        )
        .unwrap();
        assert_eq!(settings.backend, "distributed");
        let table = &settings.backends["distributed"];
        assert_eq!(table["namespace"].as_str(), Some("crawl"));
        assert_eq!(table["dedupe"].as_bool(), Some(true));
    }

    #[test]
    fn unknown_settings_key_is_config_error() {
        let err = QueueSettings::from_toml_str("[queue]\nbacknd = \"local\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = QueueSettings::from_toml_str("[queue").unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }

    #[test]
    fn builtins_are_registered() {
        assert_eq!(QueueFactory::new().supported(), vec!["distributed", "local"]);
        assert!(QueueFactory::empty().supported().is_empty());
    }

    #[tokio::test]
    async fn unknown_backend_lists_supported() {
        let settings = QueueSettings::default().with_backend("kafka");
        let err = QueueFactory::new().create(&settings).await.unwrap_err();
        let Error::Config(msg) = err else {
            panic!("expected config error, got {err:?}");
        };
        assert!(msg.contains("kafka"), "{msg}");
        assert!(msg.contains("distributed, local"), "{msg}");
    }

    #[tokio::test]
    async fn backend_name_is_normalized() {
        let settings = QueueSettings::default().with_backend("  LOCAL ");
        let queue = QueueFactory::new().create(&settings).await.unwrap();
        assert_eq!(queue.backend(), "local");
    }

    #[tokio::test]
    async fn boxed_queue_debug_names_backend() {
        let queue = QueueFactory::new()
            .create(&QueueSettings::default())
            .await
            .unwrap();
        assert_eq!(format!("{queue:?}"), "RequestQueue { backend: \"local\", .. }");
    }

    #[tokio::test]
    async fn class_key_aliases_a_constructor() {
        let mut settings = QueueSettings::default().with_backend("frontier");
        let table = settings.backend_options_mut("frontier");
        table.insert("class".into(), "local".into());
        table.insert("maxsize".into(), 3.into());

        let queue = QueueFactory::new().create(&settings).await.unwrap();
        assert_eq!(queue.backend(), "local");
    }

    #[test]
    fn resolve_follows_class_alias() {
        let mut settings = QueueSettings::default().with_backend(" Frontier ");
        let table = settings.backend_options_mut("frontier");
        table.insert("class".into(), "Distributed".into());
        table.insert("namespace".into(), "crawl".into());

        let (class, options) = settings.resolve().unwrap();
        assert_eq!(class, "distributed");
        assert_eq!(options["namespace"].as_str(), Some("crawl"));
        assert!(!options.contains_key("class"));
    }

    #[test]
    fn resolve_defaults_class_to_backend_name() {
        let settings = QueueSettings::default().with_backend("distributed");
        let (class, options) = settings.resolve().unwrap();
        assert_eq!(class, "distributed");
        assert!(options.is_empty());
    }

    #[tokio::test]
    async fn non_string_class_is_config_error() {
        let mut settings = QueueSettings::default().with_backend("frontier");
        settings
            .backend_options_mut("frontier")
            .insert("class".into(), 7.into());

        let err = QueueFactory::new().create(&settings).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn local_options_are_validated() {
        let mut settings = QueueSettings::default();
        settings
            .backend_options_mut("local")
            .insert("maxsize".into(), (-1).into());
        let err = QueueFactory::new().create(&settings).await.unwrap_err();
        assert!(matches!(err, Error::Capacity(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn distributed_options_fail_before_connecting() {
        let mut settings = QueueSettings::default().with_backend("distributed");
        settings
            .backend_options_mut("distributed")
            .insert("no_such_option".into(), true.into());
        let err = QueueFactory::new().create(&settings).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }
}
