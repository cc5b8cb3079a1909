//! Resolved table: discovered fields partitioned for statement building.

use crate::error::StoreError;
use crate::schema::types::Field;

#[derive(Clone, Debug)]
pub struct Table {
    pub schema_name: String,
    pub table_name: String,
    fields: Vec<Field>,
    key: Vec<usize>,
    mutable: Vec<usize>,
    auto_increment: Vec<usize>,
}

impl Table {
    /// Partition `fields` into key, mutable (every non-key field) and auto-increment fields.
    /// An empty field list means the table does not exist and is a configuration error.
    pub fn new(
        schema_name: impl Into<String>,
        table_name: impl Into<String>,
        fields: Vec<Field>,
    ) -> Result<Self, StoreError> {
        let schema_name = schema_name.into();
        let table_name = table_name.into();
        if fields.is_empty() {
            return Err(StoreError::Schema(format!(
                "table {}.{} has no fields",
                schema_name, table_name
            )));
        }
        let indexes = |pred: fn(&Field) -> bool| -> Vec<usize> {
            fields
                .iter()
                .enumerate()
                .filter(|(_, f)| pred(f))
                .map(|(i, _)| i)
                .collect()
        };
        let key = indexes(|f| f.is_key());
        let mutable = indexes(|f| !f.is_key());
        let auto_increment = indexes(|f| f.is_auto_increment());
        Ok(Table {
            schema_name,
            table_name,
            fields,
            key,
            mutable,
            auto_increment,
        })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn key_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.key.iter().map(|&i| &self.fields[i])
    }

    pub fn mutable_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.mutable.iter().map(|&i| &self.fields[i])
    }

    pub fn auto_increment_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.auto_increment.iter().map(|&i| &self.fields[i])
    }

    /// Fields written by INSERT: everything but auto-increment fields, in declaration order.
    pub fn insertable_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.fields.iter().filter(|f| !f.is_auto_increment())
    }

    pub fn has_auto_increment(&self) -> bool {
        !self.auto_increment.is_empty()
    }

    pub fn has_key(&self) -> bool {
        !self.key.is_empty()
    }
}
