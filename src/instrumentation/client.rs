//! Data-access client capability traits.
//!
//! A client exposes a set of entity delegates plus client-level lifecycle,
//! raw-query and transaction operations. Delegates declare at compile time
//! which CRUD-style operations they support; instrumentation discovers them
//! through [`DataAccessClient::delegates`] instead of inspecting members.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Entity-level operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Create,
    CreateMany,
    FindFirst,
    FindMany,
    FindUnique,
    Update,
    UpdateMany,
    Delete,
    DeleteMany,
    Upsert,
    Count,
    Aggregate,
    GroupBy,
}

impl Operation {
    /// Every operation instrumentation wraps.
    pub const ALL: [Operation; 13] = [
        Self::Create,
        Self::CreateMany,
        Self::FindFirst,
        Self::FindMany,
        Self::FindUnique,
        Self::Update,
        Self::UpdateMany,
        Self::Delete,
        Self::DeleteMany,
        Self::Upsert,
        Self::Count,
        Self::Aggregate,
        Self::GroupBy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::CreateMany => "create_many",
            Self::FindFirst => "find_first",
            Self::FindMany => "find_many",
            Self::FindUnique => "find_unique",
            Self::Update => "update",
            Self::UpdateMany => "update_many",
            Self::Delete => "delete",
            Self::DeleteMany => "delete_many",
            Self::Upsert => "upsert",
            Self::Count => "count",
            Self::Aggregate => "aggregate",
            Self::GroupBy => "group_by",
        }
    }

    /// Operations whose result is a single entity rather than a collection.
    pub fn returns_single_entity(&self) -> bool {
        matches!(
            self,
            Self::Create
                | Self::Update
                | Self::Upsert
                | Self::Delete
                | Self::FindFirst
                | Self::FindUnique
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-level operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientOperation {
    Connect,
    Disconnect,
    ExecuteRaw,
    QueryRaw,
    Transaction,
}

impl ClientOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::ExecuteRaw => "execute_raw",
            Self::QueryRaw => "query_raw",
            Self::Transaction => "transaction",
        }
    }
}

/// Error raised by the data-access client itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataAccessError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("{kind}: {message}")]
    Other { kind: String, message: String },
}

impl DataAccessError {
    /// Stable label for the error kind.
    pub fn kind(&self) -> &str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::UniqueViolation(_) => "unique_violation",
            Self::ForeignKeyViolation(_) => "foreign_key_violation",
            Self::Connection(_) => "connection",
            Self::Timeout(_) => "timeout",
            Self::InvalidQuery(_) => "invalid_query",
            Self::TransactionAborted(_) => "transaction_aborted",
            Self::Other { kind, .. } => kind,
        }
    }
}

/// One step of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionStep {
    pub entity: String,
    pub operation: Operation,
    pub args: Value,
}

impl TransactionStep {
    pub fn new(entity: impl Into<String>, operation: Operation, args: Value) -> Self {
        Self { entity: entity.into(), operation, args }
    }
}

/// CRUD-style operations against one entity type.
#[async_trait]
pub trait EntityDelegate: Send + Sync {
    /// Entity name, e.g. `user`.
    fn entity(&self) -> &str;

    /// Operations this delegate implements.
    fn capabilities(&self) -> &[Operation];

    async fn execute(&self, operation: Operation, args: Value) -> Result<Value, DataAccessError>;

    fn supports(&self, operation: Operation) -> bool {
        self.capabilities().contains(&operation)
    }
}

impl dyn EntityDelegate {
    pub async fn create(&self, args: Value) -> Result<Value, DataAccessError> {
        self.execute(Operation::Create, args).await
    }

    pub async fn create_many(&self, args: Value) -> Result<Value, DataAccessError> {
        self.execute(Operation::CreateMany, args).await
    }

    pub async fn find_first(&self, args: Value) -> Result<Value, DataAccessError> {
        self.execute(Operation::FindFirst, args).await
    }

    pub async fn find_many(&self, args: Value) -> Result<Value, DataAccessError> {
        self.execute(Operation::FindMany, args).await
    }

    pub async fn find_unique(&self, args: Value) -> Result<Value, DataAccessError> {
        self.execute(Operation::FindUnique, args).await
    }

    pub async fn update(&self, args: Value) -> Result<Value, DataAccessError> {
        self.execute(Operation::Update, args).await
    }

    pub async fn update_many(&self, args: Value) -> Result<Value, DataAccessError> {
        self.execute(Operation::UpdateMany, args).await
    }

    pub async fn delete(&self, args: Value) -> Result<Value, DataAccessError> {
        self.execute(Operation::Delete, args).await
    }

    pub async fn delete_many(&self, args: Value) -> Result<Value, DataAccessError> {
        self.execute(Operation::DeleteMany, args).await
    }

    pub async fn upsert(&self, args: Value) -> Result<Value, DataAccessError> {
        self.execute(Operation::Upsert, args).await
    }

    pub async fn count(&self, args: Value) -> Result<Value, DataAccessError> {
        self.execute(Operation::Count, args).await
    }

    pub async fn aggregate(&self, args: Value) -> Result<Value, DataAccessError> {
        self.execute(Operation::Aggregate, args).await
    }

    pub async fn group_by(&self, args: Value) -> Result<Value, DataAccessError> {
        self.execute(Operation::GroupBy, args).await
    }
}

/// A data-access client.
#[async_trait]
pub trait DataAccessClient: Send + Sync {
    /// Entity delegates exposed by this client.
    fn delegates(&self) -> Result<Vec<Arc<dyn EntityDelegate>>, DataAccessError>;

    /// Delegate for one entity.
    fn delegate(&self, entity: &str) -> Option<Arc<dyn EntityDelegate>> {
        self.delegates()
            .ok()?
            .into_iter()
            .find(|d| d.entity() == entity)
    }

    async fn connect(&self) -> Result<(), DataAccessError>;

    async fn disconnect(&self) -> Result<(), DataAccessError>;

    fn is_connected(&self) -> bool;

    /// Execute a statement, returning the number of affected rows.
    async fn execute_raw(&self, query: &str, params: &[Value]) -> Result<u64, DataAccessError>;

    /// Run a query, returning its rows.
    async fn query_raw(&self, query: &str, params: &[Value]) -> Result<Vec<Value>, DataAccessError>;

    /// Run all steps atomically, returning one result per step.
    async fn transaction(&self, steps: Vec<TransactionStep>) -> Result<Vec<Value>, DataAccessError>;
}
