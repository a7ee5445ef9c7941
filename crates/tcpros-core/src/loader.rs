//! Loading message types from schema files.
//!
//! `pkg/Name` is located as `<resolve(pkg)>/msg/Name.msg`. Nested types are
//! loaded first, then the type is compiled and registered. Every load goes
//! through the registry, so each schema id is read and compiled once.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::descriptor::{TypeDescriptor, nested_type_ids, split_message_id};
use crate::error::{SchemaError, SchemaResult};
use crate::registry::TypeRegistry;
use crate::resolver::{PackageResolver, PathResolver};
use crate::schema;

type LoadFuture<'a> = Pin<Box<dyn Future<Output = SchemaResult<Arc<TypeDescriptor>>> + Send + 'a>>;

/// Loads, compiles and registers message types.
#[derive(Clone)]
pub struct MessageLoader {
    registry: Arc<TypeRegistry>,
    resolver: Arc<dyn PackageResolver>,
}

impl MessageLoader {
    /// Creates a loader over a registry and resolver.
    pub fn new(registry: Arc<TypeRegistry>, resolver: Arc<dyn PackageResolver>) -> Self {
        Self { registry, resolver }
    }

    /// Creates a loader using the global registry and `ROS_PACKAGE_PATH`.
    pub fn from_env() -> Self {
        Self::new(TypeRegistry::global(), Arc::new(PathResolver::from_env()))
    }

    /// Returns the registry this loader fills.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Returns the schema file path for a message id.
    pub fn schema_path(&self, message_id: &str) -> SchemaResult<PathBuf> {
        let (package, name) = split_message_id(message_id)?;
        let package = package.ok_or_else(|| SchemaError::PackageNotFound(message_id.to_string()))?;
        let dir = self.resolver.resolve(package)?;
        Ok(dir.join("msg").join(format!("{name}.msg")))
    }

    /// Loads a message type by id, resolving its package directory.
    pub async fn load(&self, message_id: &str) -> SchemaResult<Arc<TypeDescriptor>> {
        self.load_inner(message_id.to_string(), Vec::new()).await
    }

    /// Loads a message type from an explicit schema file.
    pub async fn load_from_file(
        &self,
        message_id: &str,
        path: impl AsRef<Path>,
    ) -> SchemaResult<Arc<TypeDescriptor>> {
        let path = path.as_ref().to_path_buf();
        split_message_id(message_id)?;
        self.registry
            .get_or_try_init(message_id, || async {
                let text = read_schema(&path).await?;
                self.compile_text(message_id, &text, Vec::new()).await
            })
            .await
    }

    /// Compiles a message type from schema text.
    pub async fn load_from_text(&self, message_id: &str, text: &str) -> SchemaResult<Arc<TypeDescriptor>> {
        split_message_id(message_id)?;
        self.registry
            .get_or_try_init(message_id, || self.compile_text(message_id, text, Vec::new()))
            .await
    }

    fn load_inner(&self, message_id: String, stack: Vec<String>) -> LoadFuture<'_> {
        Box::pin(async move {
            if let Some(descriptor) = self.registry.get(&message_id) {
                return Ok(descriptor);
            }
            if stack.contains(&message_id) {
                return Err(SchemaError::RecursiveType {
                    schema_id: message_id,
                });
            }

            let path = self.schema_path(&message_id)?;
            self.registry
                .get_or_try_init(&message_id, || async {
                    debug!(schema_id = %message_id, path = %path.display(), "Loading message type");
                    let text = read_schema(&path).await?;
                    self.compile_text(&message_id, &text, stack.clone()).await
                })
                .await
        })
    }

    async fn compile_text(
        &self,
        message_id: &str,
        text: &str,
        mut stack: Vec<String>,
    ) -> SchemaResult<TypeDescriptor> {
        let fields = schema::parse(text)?;
        let (package, _) = split_message_id(message_id)?;

        stack.push(message_id.to_string());
        let mut nested = HashMap::new();
        for id in nested_type_ids(&fields, package) {
            let descriptor = self.load_inner(id.clone(), stack.clone()).await?;
            nested.insert(id, descriptor);
        }

        Ok(
            TypeDescriptor::compile(message_id, fields, schema::digest(text), |id| {
                nested.get(id).cloned()
            })?
            .with_definition(text),
        )
    }
}

async fn read_schema(path: &Path) -> SchemaResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })
}
