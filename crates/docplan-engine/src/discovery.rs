//! The paginated envelope every discovery operation returns.

use serde::{Deserialize, Serialize};

use crate::error::DocError;
use crate::query::Handle;
use crate::revision::Revision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub limit: usize,
    pub offset: usize,
    pub returned: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryItem<T> {
    pub id: String,
    pub handle: Handle,
    #[serde(flatten)]
    pub domain: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult<T> {
    pub evaluated_revision: Revision,
    pub total: usize,
    pub items: Vec<DiscoveryItem<T>>,
    pub page: PageInfo,
}

/// Page size bounds for discovery calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 500,
        }
    }
}

impl From<&docplan_config::DiscoveryConfig> for PageLimits {
    fn from(config: &docplan_config::DiscoveryConfig) -> Self {
        Self {
            default_limit: config.default_limit,
            max_limit: config.max_limit,
        }
    }
}

impl PageLimits {
    pub fn resolve(&self, limit: Option<usize>) -> Result<usize, DocError> {
        match limit {
            None => Ok(self.default_limit),
            Some(0) => Err(DocError::invalid_input("limit must be at least 1")),
            Some(limit) if limit > self.max_limit => Err(DocError::invalid_input(format!(
                "limit {limit} exceeds the maximum of {}",
                self.max_limit
            ))),
            Some(limit) => Ok(limit),
        }
    }
}

/// Slice `items` into one page. `total` is the unpaginated count.
pub fn paginate<T>(
    evaluated_revision: Revision,
    items: Vec<DiscoveryItem<T>>,
    limit: usize,
    offset: usize,
) -> DiscoveryResult<T> {
    let total = items.len();
    let items: Vec<_> = items.into_iter().skip(offset).take(limit).collect();
    DiscoveryResult {
        evaluated_revision,
        total,
        page: PageInfo {
            limit,
            offset,
            returned: items.len(),
        },
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn items(n: usize) -> Vec<DiscoveryItem<()>> {
        (0..n)
            .map(|i| DiscoveryItem {
                id: format!("n{i}"),
                handle: Handle::node(format!("n{i}")),
                domain: (),
            })
            .collect()
    }

    #[test]
    fn test_page_past_the_end_is_empty() {
        let result = paginate(Revision::new(2), items(3), 10, 5);
        assert_eq!(result.total, 3);
        assert_eq!(result.page.returned, 0);
        assert!(result.items.is_empty());
    }

    #[test]
    fn test_limits() {
        let limits = PageLimits::default();
        assert_eq!(limits.resolve(None).unwrap(), 50);
        assert_eq!(limits.resolve(Some(7)).unwrap(), 7);
        assert!(limits.resolve(Some(0)).is_err());
        assert!(limits.resolve(Some(501)).is_err());
    }

    proptest! {
        #[test]
        fn test_returned_always_equals_items_len(n in 0usize..40, limit in 1usize..15, offset in 0usize..50) {
            let result = paginate(Revision::new(0), items(n), limit, offset);
            prop_assert_eq!(result.page.returned, result.items.len());
            prop_assert!(result.page.returned <= result.page.limit);
            prop_assert_eq!(result.total, n);
        }
    }
}
