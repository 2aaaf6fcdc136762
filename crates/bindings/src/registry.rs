use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::{handler::CommandHandler, module::BindingModule};

/// Binding modules resident in this process, one per extension.
///
/// Updates from a load pass land through [`ModuleRegistry::commit`] in one
/// write, so readers never see half of a pass.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, Arc<BindingModule>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, extension: &str) -> Option<Arc<BindingModule>> {
        self.modules.read().await.get(extension).cloned()
    }

    /// Install `staged` modules and drop the `remove` extensions.
    pub async fn commit(&self, staged: Vec<Arc<BindingModule>>, remove: &[String]) {
        let mut modules = self.modules.write().await;
        for name in remove {
            if modules.remove(name).is_some() {
                tracing::debug!(extension = %name, "unloaded binding module");
            }
        }
        for module in staged {
            modules.insert(module.extension().to_string(), module);
        }
    }

    /// Handler for a command in any resident module.
    pub async fn handler(&self, unique_id: &str) -> Option<Arc<dyn CommandHandler>> {
        self.modules
            .read()
            .await
            .values()
            .find_map(|m| m.handler(unique_id))
    }

    pub async fn module_for(&self, unique_id: &str) -> Option<Arc<BindingModule>> {
        self.modules
            .read()
            .await
            .values()
            .find(|m| m.contains(unique_id))
            .cloned()
    }

    /// Resident extension names, sorted.
    pub async fn extensions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.read().await.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}
