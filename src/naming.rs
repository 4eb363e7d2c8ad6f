use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct NameScopeState {
    uids: HashMap<String, usize>,
    observed: HashSet<String>,
}

/// Layer names handed out within one construction context.
///
/// Generated names are zero based (`name`, `name_1`, `name_2`, ...) and
/// skip anything already observed in the scope, including names users
/// chose explicitly.
#[derive(Debug, Default)]
pub struct NameScope {
    state: Mutex<NameScopeState>,
}

impl NameScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, name: &str) {
        self.lock().observed.insert(name.to_string());
    }

    pub fn is_observed(&self, name: &str) -> bool {
        self.lock().observed.contains(name)
    }

    pub fn unique_name(&self, base: &str) -> String {
        let mut state = self.lock();
        loop {
            let counter = state.uids.entry(base.to_string()).or_insert(0);
            let proposed = if *counter == 0 {
                base.to_string()
            } else {
                format!("{}_{}", base, counter)
            };
            *counter += 1;
            if !state.observed.contains(&proposed) {
                state.observed.insert(proposed.clone());
                return proposed;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NameScopeState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
