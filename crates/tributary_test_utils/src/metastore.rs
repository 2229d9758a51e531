use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tributary_catalog::{CatalogColumn, CatalogDatabase, CatalogTable, Metastore, MetastoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetastoreCall {
    CreateDatabase(CatalogDatabase),
    DropDatabase(String),
    GetTable(String, String),
    CreateTable(CatalogTable),
    AlterTable(CatalogTable),
    DropTable(String, String),
    ListTables(String),
    GetColumns(String, String),
}

impl MetastoreCall {
    pub fn op(&self) -> &'static str {
        match self {
            MetastoreCall::CreateDatabase(_) => "create_database",
            MetastoreCall::DropDatabase(_) => "drop_database",
            MetastoreCall::GetTable(..) => "get_table",
            MetastoreCall::CreateTable(_) => "create_table",
            MetastoreCall::AlterTable(_) => "alter_table",
            MetastoreCall::DropTable(..) => "drop_table",
            MetastoreCall::ListTables(_) => "list_tables",
            MetastoreCall::GetColumns(..) => "get_columns",
        }
    }
}

#[derive(Default)]
struct State {
    databases: BTreeMap<String, CatalogDatabase>,
    tables: BTreeMap<(String, String), CatalogTable>,
    calls: Vec<MetastoreCall>,
    failures: HashMap<&'static str, String>,
}

/// In-memory metastore that records every call.
#[derive(Default)]
pub struct FakeMetastore {
    state: Mutex<State>,
}

impl FakeMetastore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `call`, then fail if its operation was told to.
    fn enter(&self, call: MetastoreCall) -> Result<std::sync::MutexGuard<'_, State>, MetastoreError> {
        let mut state = self.state();
        let op = call.op();
        state.calls.push(call);
        if let Some(message) = state.failures.get(op) {
            return Err(MetastoreError::Unavailable(message.clone()));
        }
        Ok(state)
    }

    pub fn fail_on(&self, op: &'static str, message: impl Into<String>) {
        self.state().failures.insert(op, message.into());
    }

    pub fn clear_failure(&self, op: &'static str) {
        self.state().failures.remove(op);
    }

    pub fn insert_database(&self, name: &str, location: &str) {
        self.state().databases.insert(
            name.to_string(),
            CatalogDatabase {
                name: name.to_string(),
                location: location.to_string(),
            },
        );
    }

    pub fn insert_table(&self, table: CatalogTable) {
        let mut state = self.state();
        state.databases.entry(table.database.clone()).or_insert_with(|| CatalogDatabase {
            name: table.database.clone(),
            location: String::new(),
        });
        state
            .tables
            .insert((table.database.clone(), table.name.clone()), table);
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.state().databases.contains_key(name)
    }

    pub fn database(&self, name: &str) -> Option<CatalogDatabase> {
        self.state().databases.get(name).cloned()
    }

    pub fn table(&self, database: &str, name: &str) -> Option<CatalogTable> {
        self.state()
            .tables
            .get(&(database.to_string(), name.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<MetastoreCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.state().calls.iter().filter(|c| c.op() == op).count()
    }

    /// Calls other than reads.
    pub fn writes(&self) -> Vec<MetastoreCall> {
        self.calls()
            .into_iter()
            .filter(|c| {
                !matches!(
                    c,
                    MetastoreCall::GetTable(..)
                        | MetastoreCall::ListTables(_)
                        | MetastoreCall::GetColumns(..)
                )
            })
            .collect()
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }
}

fn table_key(database: &str, name: &str) -> (String, String) {
    (database.to_string(), name.to_string())
}

#[async_trait]
impl Metastore for FakeMetastore {
    async fn create_database(&self, database: &CatalogDatabase) -> Result<(), MetastoreError> {
        let mut state = self.enter(MetastoreCall::CreateDatabase(database.clone()))?;
        if state.databases.contains_key(&database.name) {
            return Err(MetastoreError::AlreadyExists(database.name.clone()));
        }
        state.databases.insert(database.name.clone(), database.clone());
        Ok(())
    }

    async fn drop_database(
        &self,
        name: &str,
        _delete_data: bool,
        cascade: bool,
    ) -> Result<(), MetastoreError> {
        let mut state = self.enter(MetastoreCall::DropDatabase(name.to_string()))?;
        if !state.databases.contains_key(name) {
            return Err(MetastoreError::not_found(format!("database {}", name)));
        }
        let has_tables = state.tables.keys().any(|(db, _)| db == name);
        if has_tables && !cascade {
            return Err(MetastoreError::Rejected(format!("database {} is not empty", name)));
        }
        state.tables.retain(|(db, _), _| db != name);
        state.databases.remove(name);
        Ok(())
    }

    async fn get_table(&self, database: &str, name: &str) -> Result<CatalogTable, MetastoreError> {
        let state = self.enter(MetastoreCall::GetTable(database.to_string(), name.to_string()))?;
        state
            .tables
            .get(&table_key(database, name))
            .cloned()
            .ok_or_else(|| MetastoreError::not_found(format!("table {}.{}", database, name)))
    }

    async fn create_table(&self, table: &CatalogTable) -> Result<(), MetastoreError> {
        let mut state = self.enter(MetastoreCall::CreateTable(table.clone()))?;
        if !state.databases.contains_key(&table.database) {
            return Err(MetastoreError::not_found(format!("database {}", table.database)));
        }
        let key = table_key(&table.database, &table.name);
        if state.tables.contains_key(&key) {
            return Err(MetastoreError::AlreadyExists(format!("table {}.{}", key.0, key.1)));
        }
        state.tables.insert(key, table.clone());
        Ok(())
    }

    async fn alter_table(
        &self,
        database: &str,
        name: &str,
        table: &CatalogTable,
    ) -> Result<(), MetastoreError> {
        let mut state = self.enter(MetastoreCall::AlterTable(table.clone()))?;
        let key = table_key(database, name);
        if !state.tables.contains_key(&key) {
            return Err(MetastoreError::not_found(format!("table {}.{}", database, name)));
        }
        state.tables.insert(key, table.clone());
        Ok(())
    }

    async fn drop_table(
        &self,
        database: &str,
        name: &str,
        _delete_data: bool,
    ) -> Result<(), MetastoreError> {
        let mut state = self.enter(MetastoreCall::DropTable(database.to_string(), name.to_string()))?;
        state
            .tables
            .remove(&table_key(database, name))
            .map(|_| ())
            .ok_or_else(|| MetastoreError::not_found(format!("table {}.{}", database, name)))
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>, MetastoreError> {
        let state = self.enter(MetastoreCall::ListTables(database.to_string()))?;
        if !state.databases.contains_key(database) {
            return Err(MetastoreError::not_found(format!("database {}", database)));
        }
        Ok(state
            .tables
            .keys()
            .filter(|(db, _)| db == database)
            .map(|(_, name)| name.clone())
            .collect())
    }

    async fn get_columns(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<CatalogColumn>, MetastoreError> {
        let state = self.enter(MetastoreCall::GetColumns(database.to_string(), table.to_string()))?;
        state
            .tables
            .get(&table_key(database, table))
            .map(|t| t.columns.clone())
            .ok_or_else(|| MetastoreError::not_found(format!("table {}.{}", database, table)))
    }
}
