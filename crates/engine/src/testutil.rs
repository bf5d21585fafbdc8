//! Scriptable page double for engine unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use crate::page::{ElementSnapshot, Page};
use testwright_common::{Error, Result};

/// A `Page` whose `find` results are scripted per selector. Each scripted
/// batch is served once; the final batch repeats for all later calls.
/// Interactions are logged for assertion.
#[derive(Default)]
pub struct MockPage {
    finds: Mutex<HashMap<String, VecDeque<Vec<ElementSnapshot>>>>,
    events: Mutex<Vec<String>>,
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_find(&self, selector: &str, batch: Vec<ElementSnapshot>) {
        self.finds
            .lock()
            .entry(selector.to_string())
            .or_default()
            .push_back(batch);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn log(&self, event: String) {
        self.events.lock().push(event);
    }

    fn next_batch(&self, selector: &str) -> Result<Vec<ElementSnapshot>> {
        let mut finds = self.finds.lock();
        let queue = finds
            .get_mut(selector)
            .ok_or_else(|| Error::Page(format!("unscripted selector: {selector}")))?;
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap_or_default())
        } else {
            Ok(queue.front().cloned().unwrap_or_default())
        }
    }
}

#[async_trait]
impl Page for MockPage {
    async fn find(&self, selector: &str) -> Result<Vec<ElementSnapshot>> {
        self.next_batch(selector)
    }

    async fn find_within(
        &self,
        element_id: &str,
        selector: &str,
    ) -> Result<Vec<ElementSnapshot>> {
        self.next_batch(&format!("{element_id} {selector}"))
    }

    async fn click(&self, element_id: &str) -> Result<()> {
        self.log(format!("click:{element_id}"));
        Ok(())
    }

    async fn type_text(&self, element_id: &str, text: &str) -> Result<()> {
        self.log(format!("type:{element_id}:{text}"));
        Ok(())
    }

    async fn clear(&self, element_id: &str) -> Result<()> {
        self.log(format!("clear:{element_id}"));
        Ok(())
    }

    async fn select(&self, element_id: &str, value: &str) -> Result<()> {
        self.log(format!("select:{element_id}:{value}"));
        Ok(())
    }

    async fn pointer_press(&self, x: f64, y: f64) -> Result<()> {
        self.log(format!("press:{x},{y}"));
        Ok(())
    }

    async fn pointer_move(&self, x: f64, y: f64) -> Result<()> {
        self.log(format!("move:{x},{y}"));
        Ok(())
    }

    async fn pointer_release(&self) -> Result<()> {
        self.log("release".to_string());
        Ok(())
    }

    async fn visit(&self, path: &str) -> Result<()> {
        self.log(format!("visit:{path}"));
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.log("reload".to_string());
        Ok(())
    }
}
