use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use vista_core::models::SearchDocument;
use vista_core::StoreResult;

use crate::traits::SearchIndex;

struct Indexed {
    document: SearchDocument,
    terms: Vec<String>,
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Term-matching search over documents held in memory.
///
/// Every plain term of the expression must occur in a document; terms
/// prefixed with `-` must not. Documents are ranked by how many query terms
/// they contain, then by id.
#[derive(Clone, Default)]
pub struct MemorySearchIndex {
    inner: Arc<Mutex<BTreeMap<String, Indexed>>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn upsert(&self, document: &SearchDocument) -> StoreResult<()> {
        let terms = tokenize(&document.searchable_text());
        self.inner.lock().await.insert(
            document.id.clone(),
            Indexed {
                document: document.clone(),
                terms,
            },
        );
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.inner.lock().await.remove(id);
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<SearchDocument>> {
        Ok(self.inner.lock().await.get(id).map(|i| i.document.clone()))
    }

    async fn query(&self, expression: &str, limit: i64) -> StoreResult<Vec<String>> {
        let mut required = Vec::new();
        let mut excluded = Vec::new();
        for word in expression.split_whitespace() {
            match word.strip_prefix('-') {
                Some(rest) => excluded.extend(tokenize(rest)),
                None => required.extend(tokenize(word)),
            }
        }
        if required.is_empty() {
            return Ok(Vec::new());
        }

        let docs = self.inner.lock().await;
        let mut hits: Vec<(usize, &String)> = docs
            .iter()
            .filter(|(_, doc)| {
                required.iter().all(|t| doc.terms.contains(t))
                    && !excluded.iter().any(|t| doc.terms.contains(t))
            })
            .map(|(id, doc)| {
                let score = doc.terms.iter().filter(|t| required.contains(t)).count();
                (score, id)
            })
            .collect();
        hits.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(hits.into_iter().take(limit).map(|(_, id)| id.clone()).collect())
    }
}
