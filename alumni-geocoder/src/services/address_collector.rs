//! Candidate collection
//!
//! Reads profiles that still lack coordinates and turns them into
//! geocoding queries. Collection never writes.

use std::sync::Arc;

use alumni_common::Result;

use crate::models::AddressQuery;
use crate::services::address_formatter::format_address;
use crate::types::ProfileStore;

pub struct AddressCollector {
    store: Arc<dyn ProfileStore>,
}

impl AddressCollector {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Up to `page_size` queries for profiles with an address but no latitude
    ///
    /// A read failure is returned as-is; the caller treats it as fatal.
    pub async fn collect(&self, page_size: usize) -> Result<Vec<AddressQuery>> {
        let rows = self.store.fetch_missing_coordinates(page_size).await?;
        let fetched = rows.len();

        let queries: Vec<AddressQuery> = rows
            .iter()
            .filter_map(|fields| {
                let query = format_address(fields);
                if query.is_empty() {
                    None
                } else {
                    Some(AddressQuery::new(fields.user_id.clone(), query))
                }
            })
            .collect();

        tracing::debug!(
            fetched,
            candidates = queries.len(),
            page_size,
            "Collected geocoding candidates"
        );

        Ok(queries)
    }
}
