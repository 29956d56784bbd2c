// Metadata source that fails a configurable number of times per identifier

use async_trait::async_trait;
use mdc_core::{MetadataSource, WorkItem};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

pub struct ScriptedSource {
    host: String,
    /// Failure message and how many times to fail, per identifier
    failures: HashMap<String, (String, u32)>,
    calls: Mutex<HashMap<String, u32>>,
    total: AtomicU32,
}

impl ScriptedSource {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            failures: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            total: AtomicU32::new(0),
        }
    }

    /// Fail `times` calls for `identifier` with `message`, then succeed
    pub fn failing(mut self, identifier: &str, message: &str, times: u32) -> Self {
        self.failures
            .insert(identifier.to_string(), (message.to_string(), times));
        self
    }

    pub fn calls_for(&self, identifier: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(identifier)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for ScriptedSource {
    type Output = String;

    fn host(&self) -> &str {
        &self.host
    }

    async fn fetch(&self, item: &WorkItem) -> anyhow::Result<String> {
        self.total.fetch_add(1, Ordering::SeqCst);
        let identifier = item.identifier.value().to_string();
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(identifier.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if let Some((message, times)) = self.failures.get(&identifier) {
            if call <= *times {
                anyhow::bail!("{message}");
            }
        }

        tokio::task::yield_now().await;
        Ok(format!("<movie id=\"{identifier}\"/>"))
    }
}
