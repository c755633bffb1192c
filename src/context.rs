//! Shared wiring for all migration components.
//!
//! One [`MigrationContext`] is constructed at startup and passed by `Arc`
//! into everything that needs engine access. There are no connection
//! singletons; tests build as many isolated contexts as they like.

use crate::convert::{PgType, TypeConverter};
use crate::db::DatabaseHandle;
use crate::environment::EnvironmentSwitcher;
use crate::error::Result;
use crate::sync::lock::LockRegistry;
use crate::sync::DirectionGroup;
use crate::tracker::{EventStore, MigrationStatusTracker};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct MigrationContext {
    pub source: Arc<dyn DatabaseHandle>,
    pub target: Arc<dyn DatabaseHandle>,
    pub tracker: Arc<MigrationStatusTracker>,
    pub environment: Arc<EnvironmentSwitcher>,
    pub converter: TypeConverter,
    /// Table exclusivity markers, shared by every synchronizer built over
    /// this context.
    pub(crate) sync_locks: LockRegistry<(String, DirectionGroup)>,
}

impl MigrationContext {
    /// Wire up a context over two engine handles and an event store.
    pub async fn new(
        source: Arc<dyn DatabaseHandle>,
        target: Arc<dyn DatabaseHandle>,
        store: Arc<dyn EventStore>,
        converter: TypeConverter,
    ) -> Result<Arc<Self>> {
        let tracker = Arc::new(MigrationStatusTracker::open(store).await?);
        let environment = Arc::new(
            EnvironmentSwitcher::open(
                Arc::clone(&source),
                Arc::clone(&target),
                Arc::clone(&tracker),
            )
            .await?,
        );
        Ok(Arc::new(MigrationContext {
            source,
            target,
            tracker,
            environment,
            converter,
            sync_locks: LockRegistry::new(),
        }))
    }

    /// Source-side column types for a table, parsed into the converter's
    /// vocabulary. The source schema is authoritative for conversion.
    pub async fn source_column_types(&self, table: &str) -> Result<BTreeMap<String, PgType>> {
        let columns = self.source.fetch_columns(table).await?;
        let mut types = BTreeMap::new();
        for column in &columns {
            types.insert(column.name.clone(), PgType::parse(&column.data_type)?);
        }
        Ok(types)
    }
}
