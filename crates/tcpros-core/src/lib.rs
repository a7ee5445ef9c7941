//! Message schemas, compiled types and the binary codec.

pub mod codec;
pub mod descriptor;
pub mod error;
pub mod json;
pub mod loader;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod tracing;
pub mod validate;
pub mod value;

pub use codec::{Reader, decode, decode_body, decode_from, encode, encode_body, size};
pub use descriptor::{ElementKind, Field, FieldKind, TypeDescriptor, resolve_type_id, split_message_id};
pub use error::{CodecError, CodecResult, SchemaError, SchemaResult, ValidationError};
pub use loader::MessageLoader;
pub use registry::TypeRegistry;
pub use resolver::{PackageResolver, PathResolver, StaticResolver};
pub use schema::FieldDescriptor;
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use value::{Duration, MessageInstance, PrimitiveType, Time, Value};
