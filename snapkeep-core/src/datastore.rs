use crate::constants::datastore::DUMP_FORMAT_VERSION;
use crate::error::{Result, SnapError};
use duckdb::{Connection, params, params_from_iter};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 业务数据存储（DuckDB 文件）
#[derive(Debug, Clone)]
pub struct DataStore {
    path: PathBuf,
    excluded_tables: Vec<String>,
}

/// 数据存储导出内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStoreDump {
    pub format_version: u32,
    pub tables: Vec<TableDump>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDump {
    pub name: String,
    /// 原始建表语句，保留主键、外键等约束
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_sql: Option<String>,
    /// 通过外键引用的其他表
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    pub columns: Vec<ColumnDef>,
    /// 所有值以文本形式保存，NULL 为 None
    pub rows: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl DataStoreDump {
    /// 序列化为稳定的文本格式
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let dump: DataStoreDump = serde_json::from_slice(bytes)?;
        if dump.format_version != DUMP_FORMAT_VERSION {
            return Err(SnapError::custom(format!(
                "不支持的导出格式版本: {}",
                dump.format_version
            )));
        }
        Ok(dump)
    }

    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }
}

impl DataStore {
    pub fn new(path: impl Into<PathBuf>, excluded_tables: Vec<String>) -> Self {
        Self {
            path: path.into(),
            excluded_tables,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_excluded(&self, table: &str) -> bool {
        self.excluded_tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table))
    }

    /// 导出全部非排除表
    ///
    /// 表按名称排序，列按定义顺序，行按所有列排序，相同数据总是得到相同输出。
    /// 导出期间不对数据存储加锁。
    pub fn dump(&self) -> Result<DataStoreDump> {
        if !self.path.exists() {
            return Err(SnapError::custom(format!(
                "数据存储文件不存在: {}",
                self.path.display()
            )));
        }

        let conn = Connection::open(&self.path)?;
        let foreign_keys = list_foreign_keys(&conn)?;
        let mut tables = Vec::new();

        for name in list_base_tables(&conn)? {
            if self.is_excluded(&name) {
                debug!("跳过排除表: {}", name);
                continue;
            }

            let columns = list_columns(&conn, &name)?;
            if columns.is_empty() {
                continue;
            }

            let select_list = columns
                .iter()
                .map(|c| format!("CAST({} AS VARCHAR)", quote_ident(&c.name)))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT {select_list} FROM {} ORDER BY ALL",
                quote_ident(&name)
            );

            let mut stmt = conn.prepare(&sql)?;
            let column_count = columns.len();
            let row_iter = stmt.query_map([], |row| {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    values.push(row.get::<_, Option<String>>(i)?);
                }
                Ok(values)
            })?;

            let mut rows = Vec::new();
            for row in row_iter {
                rows.push(row?);
            }

            debug!("导出表 {}: {} 行", name, rows.len());
            let references = foreign_keys
                .iter()
                .filter(|(table, referenced)| table == &name && referenced != &name)
                .map(|(_, referenced)| referenced.clone())
                .collect();
            tables.push(TableDump {
                create_sql: table_create_sql(&conn, &name)?,
                references,
                name,
                columns,
                rows,
            });
        }

        Ok(DataStoreDump {
            format_version: DUMP_FORMAT_VERSION,
            tables,
        })
    }

    /// 用导出内容整体替换数据存储（先清空再加载，不做合并）
    ///
    /// 在单个事务中删除所有非排除表并按导出重建。排除表保持不变。
    pub fn replace_with(&self, dump: &DataStoreDump) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(&self.path)?;
        let tx = conn.transaction()?;

        // 引用方先删除，被引用的表最后删除
        let live_tables: Vec<String> = list_base_tables(&tx)?
            .into_iter()
            .filter(|name| !self.is_excluded(name))
            .collect();
        let live_foreign_keys = list_foreign_keys(&tx)?;
        for name in dependency_order(&live_tables, &live_foreign_keys)
            .iter()
            .rev()
        {
            tx.execute_batch(&format!("DROP TABLE {}", quote_ident(name)))?;
        }

        let mut by_name = BTreeMap::new();
        for table in &dump.tables {
            if self.is_excluded(&table.name) {
                warn!("导出中包含排除表 {}，已忽略", table.name);
                continue;
            }
            by_name.insert(table.name.clone(), table);
        }
        let dumped_names: Vec<String> = by_name.keys().cloned().collect();
        let dumped_foreign_keys: Vec<(String, String)> = by_name
            .values()
            .flat_map(|table| {
                table
                    .references
                    .iter()
                    .map(move |referenced| (table.name.clone(), referenced.clone()))
            })
            .collect();

        // 被引用的表先创建并写入数据
        for name in dependency_order(&dumped_names, &dumped_foreign_keys) {
            let Some(table) = by_name.get(&name) else {
                continue;
            };

            match &table.create_sql {
                Some(create_sql) => tx.execute_batch(create_sql)?,
                None => {
                    let column_defs = table
                        .columns
                        .iter()
                        .map(|c| format!("{} {}", quote_ident(&c.name), c.data_type))
                        .collect::<Vec<_>>()
                        .join(", ");
                    tx.execute_batch(&format!(
                        "CREATE TABLE {} ({column_defs})",
                        quote_ident(&table.name)
                    ))?;
                }
            }

            let placeholders = table
                .columns
                .iter()
                .map(|c| format!("CAST(? AS {})", c.data_type))
                .collect::<Vec<_>>()
                .join(", ");
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} VALUES ({placeholders})",
                quote_ident(&table.name)
            ))?;

            for row in &table.rows {
                if row.len() != table.columns.len() {
                    return Err(SnapError::custom(format!(
                        "表 {} 的行列数不匹配: 期望 {}，实际 {}",
                        table.name,
                        table.columns.len(),
                        row.len()
                    )));
                }
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }

        tx.commit()?;
        info!(
            "数据存储已替换: {} 张表, {} 行",
            dump.tables.len(),
            dump.row_count()
        );
        Ok(())
    }
}

fn list_base_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT table_name FROM information_schema.tables
         WHERE table_schema = 'main' AND table_type = 'BASE TABLE'
         ORDER BY table_name",
    )?;
    let names = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut tables = Vec::new();
    for name in names {
        tables.push(name?);
    }
    Ok(tables)
}

/// 外键关系 (引用方, 被引用表)
fn list_foreign_keys(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT table_name, referenced_table FROM duckdb_constraints()
         WHERE database_name = current_database() AND schema_name = 'main'
           AND constraint_type = 'FOREIGN KEY' AND referenced_table IS NOT NULL
         ORDER BY ALL",
    )?;
    let edges = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut result = Vec::new();
    for edge in edges {
        result.push(edge?);
    }
    Ok(result)
}

fn table_create_sql(conn: &Connection, table: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare(
        "SELECT sql FROM duckdb_tables()
         WHERE database_name = current_database() AND schema_name = 'main'
           AND table_name = ?",
    )?;
    let mut rows = stmt.query(params![table])?;
    match rows.next()? {
        Some(row) => Ok(row.get::<_, Option<String>>(0)?),
        None => Ok(None),
    }
}

/// 按外键依赖排序，被引用的表排在引用方之前
///
/// 同一层内按名称排序。自引用不影响顺序，存在环时剩余的表按名称追加。
fn dependency_order(tables: &[String], foreign_keys: &[(String, String)]) -> Vec<String> {
    let mut pending: BTreeMap<&str, BTreeSet<&str>> = tables
        .iter()
        .map(|name| (name.as_str(), BTreeSet::new()))
        .collect();
    for (table, referenced) in foreign_keys {
        if table == referenced || !pending.contains_key(referenced.as_str()) {
            continue;
        }
        if let Some(deps) = pending.get_mut(table.as_str()) {
            deps.insert(referenced.as_str());
        }
    }

    let mut ordered = Vec::with_capacity(tables.len());
    loop {
        let ready: Vec<&str> = pending
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(name, _)| *name)
            .collect();
        if ready.is_empty() {
            break;
        }
        for name in &ready {
            pending.remove(name);
            ordered.push(name.to_string());
        }
        for deps in pending.values_mut() {
            for name in &ready {
                deps.remove(name);
            }
        }
    }

    if !pending.is_empty() {
        warn!("表之间存在循环外键引用: {:?}", pending.keys().collect::<Vec<_>>());
        ordered.extend(pending.keys().map(|name| name.to_string()));
    }
    ordered
}

fn list_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnDef>> {
    let mut stmt = conn.prepare(
        "SELECT column_name, data_type FROM information_schema.columns
         WHERE table_schema = 'main' AND table_name = ?
         ORDER BY ordinal_position",
    )?;
    let columns = stmt.query_map(params![table], |row| {
        Ok(ColumnDef {
            name: row.get(0)?,
            data_type: row.get(1)?,
        })
    })?;

    let mut result = Vec::new();
    for column in columns {
        result.push(column?);
    }
    Ok(result)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    /// 创建带样例数据的数据存储
    pub(crate) fn seed_datastore(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER, name VARCHAR, joined TIMESTAMP, score DOUBLE);
             INSERT INTO users VALUES
                (2, 'bob', '2024-02-01 08:30:00', 7.5),
                (1, 'alice', '2024-01-15 12:00:00', NULL),
                (3, NULL, NULL, 0.25);
             CREATE TABLE tasks (id INTEGER, title VARCHAR, done BOOLEAN);
             INSERT INTO tasks VALUES (10, '写周报', false), (11, 'review \"quoted\"', true);
             CREATE TABLE sessions (token VARCHAR, user_id INTEGER);
             INSERT INTO sessions VALUES ('abc', 1);",
        )
        .unwrap();
    }

    fn default_excluded() -> Vec<String> {
        vec!["sessions".to_string(), "schema_migrations".to_string()]
    }

    #[test]
    fn test_dump_is_deterministic() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("app.duckdb");
        seed_datastore(&path);

        let store = DataStore::new(&path, default_excluded());
        let first = store.dump().unwrap().to_bytes().unwrap();
        let second = store.dump().unwrap().to_bytes().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_dump_skips_excluded_tables_and_orders() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("app.duckdb");
        seed_datastore(&path);

        let dump = DataStore::new(&path, default_excluded()).dump().unwrap();
        let names: Vec<_> = dump.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["tasks", "users"]);

        let users = &dump.tables[1];
        assert_eq!(users.columns[0].name, "id");
        assert_eq!(users.columns[0].data_type, "INTEGER");
        assert_eq!(users.rows[0][0].as_deref(), Some("1"));
        assert_eq!(users.rows[0][3], None);
    }

    #[test]
    fn test_replace_round_trip_into_empty_store() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("source.duckdb");
        seed_datastore(&source);
        let dump = DataStore::new(&source, default_excluded()).dump().unwrap();

        let target = temp_dir.path().join("target.duckdb");
        let target_store = DataStore::new(&target, default_excluded());
        target_store.replace_with(&dump).unwrap();

        let restored = target_store.dump().unwrap();
        assert_eq!(restored.to_bytes().unwrap(), dump.to_bytes().unwrap());
    }

    #[test]
    fn test_replace_wipes_existing_tables_but_keeps_excluded() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("source.duckdb");
        seed_datastore(&source);
        let dump = DataStore::new(&source, default_excluded()).dump().unwrap();

        let target = temp_dir.path().join("target.duckdb");
        {
            let conn = Connection::open(&target).unwrap();
            conn.execute_batch(
                "CREATE TABLE stale (x INTEGER);
                 INSERT INTO stale VALUES (1);
                 CREATE TABLE users (id INTEGER, name VARCHAR, joined TIMESTAMP, score DOUBLE);
                 INSERT INTO users VALUES (99, 'ghost', NULL, NULL);
                 CREATE TABLE sessions (token VARCHAR, user_id INTEGER);
                 INSERT INTO sessions VALUES ('keep-me', 5);",
            )
            .unwrap();
        }

        DataStore::new(&target, default_excluded())
            .replace_with(&dump)
            .unwrap();

        let conn = Connection::open(&target).unwrap();
        let tables = list_base_tables(&conn).unwrap();
        assert!(!tables.contains(&"stale".to_string()));

        let ghost: i64 = conn
            .query_row("SELECT COUNT(*) FROM users WHERE id = 99", [], |r| r.get(0))
            .unwrap();
        assert_eq!(ghost, 0);

        let token: String = conn
            .query_row("SELECT token FROM sessions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(token, "keep-me");
    }

    fn seed_relational(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE departments (id INTEGER PRIMARY KEY, name VARCHAR NOT NULL);
             INSERT INTO departments VALUES (1, '研发'), (2, '运营');
             CREATE TABLE tasks (
                id INTEGER PRIMARY KEY,
                dept_id INTEGER REFERENCES departments(id),
                title VARCHAR
             );
             INSERT INTO tasks VALUES (10, 1, '上线'), (11, 2, NULL);",
        )
        .unwrap();
    }

    #[test]
    fn test_replace_with_foreign_keys_keeps_constraints() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("app.duckdb");
        seed_relational(&path);

        let store = DataStore::new(&path, default_excluded());
        let dump = store.dump().unwrap();
        let tasks = dump
            .tables
            .iter()
            .find(|t| t.name == "tasks")
            .unwrap();
        assert_eq!(tasks.references, vec!["departments".to_string()]);
        assert!(tasks.create_sql.is_some());

        store.replace_with(&dump).unwrap();
        assert_eq!(
            store.dump().unwrap().to_bytes().unwrap(),
            dump.to_bytes().unwrap()
        );

        let conn = Connection::open(&path).unwrap();
        assert!(
            conn.execute("INSERT INTO tasks VALUES (12, 999, 'orphan')", [])
                .is_err()
        );
        assert!(
            conn.execute("INSERT INTO departments VALUES (1, 'duplicate')", [])
                .is_err()
        );
    }

    #[test]
    fn test_replace_with_foreign_keys_into_empty_store() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("source.duckdb");
        seed_relational(&source);
        let dump = DataStore::new(&source, default_excluded()).dump().unwrap();

        let target = DataStore::new(temp_dir.path().join("target.duckdb"), default_excluded());
        target.replace_with(&dump).unwrap();
        target.replace_with(&dump).unwrap();
        assert_eq!(target.dump().unwrap(), dump);
    }

    #[test]
    fn test_dependency_order() {
        let tables = vec![
            "a_orders".to_string(),
            "m_items".to_string(),
            "z_customers".to_string(),
        ];
        let foreign_keys = vec![
            ("a_orders".to_string(), "z_customers".to_string()),
            ("m_items".to_string(), "a_orders".to_string()),
            ("m_items".to_string(), "m_items".to_string()),
            ("m_items".to_string(), "sessions".to_string()),
        ];
        assert_eq!(
            dependency_order(&tables, &foreign_keys),
            vec!["z_customers", "a_orders", "m_items"]
        );

        let cyclic = vec![
            ("a_orders".to_string(), "z_customers".to_string()),
            ("z_customers".to_string(), "a_orders".to_string()),
        ];
        assert_eq!(
            dependency_order(&tables, &cyclic),
            vec!["m_items", "a_orders", "z_customers"]
        );
    }

    #[test]
    fn test_dump_missing_store_fails() {
        let temp_dir = tempdir().unwrap();
        let store = DataStore::new(temp_dir.path().join("missing.duckdb"), vec![]);
        assert!(store.dump().is_err());
    }
}
