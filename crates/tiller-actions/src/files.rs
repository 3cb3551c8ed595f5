//! File-reference hydration.

use async_trait::async_trait;
use tiller_core::Value;
use tiller_query::{Row, Scope};

use crate::error::ActionError;

/// Turns a stored file reference into a response object (signed URL,
/// metadata). Implemented by the storage layer; the engine only knows
/// which columns hold references.
#[async_trait]
pub trait FileResolver: Send + Sync {
    async fn hydrate(&self, reference: &Value) -> anyhow::Result<Value>;
}

/// Replace file-reference column values with hydrated objects.
pub(crate) async fn hydrate_row(
    scope: &Scope<'_>,
    resolver: Option<&dyn FileResolver>,
    row: &mut Row,
) -> Result<(), ActionError> {
    let Some(resolver) = resolver else {
        return Ok(());
    };
    for field in &scope.model.fields {
        if !field.is_file() {
            continue;
        }
        let column = field.column_name();
        let Some(value) = row.get(&column) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let hydrated = resolver
            .hydrate(value)
            .await
            .map_err(|err| ActionError::FileHydration(err.to_string()))?;
        row.insert(column, hydrated);
    }
    Ok(())
}

pub(crate) async fn hydrate_rows(
    scope: &Scope<'_>,
    resolver: Option<&dyn FileResolver>,
    rows: &mut [Row],
) -> Result<(), ActionError> {
    if resolver.is_none() {
        return Ok(());
    }
    for row in rows.iter_mut() {
        hydrate_row(scope, resolver, row).await?;
    }
    Ok(())
}
