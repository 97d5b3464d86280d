//! Notification port: tells the host what to re-render.
//!
//! Routing is decided while the form state is locked and run after the lock
//! is released, so render callbacks may call back into the form.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::types::RenderReason;

/// How the host should re-render the whole form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Regular state update
    State,
    /// Forced update, bypassing any change detection the host does
    Force,
}

/// Global re-render target supplied by the host.
pub trait Renderer: Send + Sync {
    fn render(&self, mode: RenderMode);
}

impl<F> Renderer for F
where
    F: Fn(RenderMode) + Send + Sync,
{
    fn render(&self, mode: RenderMode) {
        self(mode)
    }
}

/// Per-field re-render override.
pub type ReRender = Arc<dyn Fn(&RenderReason) + Send + Sync>;

/// A routed notification, ready to run once the state lock is gone.
pub(crate) enum RenderPlan {
    Fields {
        callbacks: Vec<ReRender>,
        reason: RenderReason,
    },
    Global(RenderMode),
}

impl RenderPlan {
    /// Only per-field callbacks when every named field has one; otherwise a
    /// global re-render.
    pub(crate) fn route(
        names: Option<&[String]>,
        reason: RenderReason,
        re_renders: &HashMap<String, ReRender>,
        force_update: bool,
    ) -> Self {
        if let Some(names) = names.filter(|names| !names.is_empty()) {
            let callbacks: Option<Vec<ReRender>> = names
                .iter()
                .map(|name| re_renders.get(name).cloned())
                .collect();
            if let Some(callbacks) = callbacks {
                trace!(?names, %reason, "Routing notify to field re-renders");
                return RenderPlan::Fields { callbacks, reason };
            }
        }

        let mode = if force_update {
            RenderMode::Force
        } else {
            RenderMode::State
        };
        trace!(?mode, %reason, "Routing notify to global re-render");
        RenderPlan::Global(mode)
    }

    pub(crate) fn run(self, renderer: Option<&Arc<dyn Renderer>>) {
        match self {
            RenderPlan::Fields { callbacks, reason } => {
                for callback in callbacks {
                    callback(&reason);
                }
            }
            RenderPlan::Global(mode) => {
                if let Some(renderer) = renderer {
                    renderer.render(mode);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &str) -> ReRender {
        let log = log.clone();
        let name = name.to_string();
        Arc::new(move |reason: &RenderReason| {
            log.lock().unwrap().push(format!("{name}:{reason}"));
        })
    }

    #[test]
    fn test_all_named_fields_with_overrides() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut re_renders = HashMap::new();
        re_renders.insert("a".to_string(), recorder(&log, "a"));
        re_renders.insert("b".to_string(), recorder(&log, "b"));

        let names = vec!["a".to_string(), "b".to_string()];
        let plan = RenderPlan::route(Some(&names), RenderReason::Validate, &re_renders, false);
        plan.run(None);
        assert_eq!(*log.lock().unwrap(), vec!["a:validate", "b:validate"]);
    }

    #[test]
    fn test_missing_override_falls_back_to_global() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut re_renders = HashMap::new();
        re_renders.insert("a".to_string(), recorder(&log, "a"));

        let modes = Arc::new(Mutex::new(Vec::new()));
        let seen = modes.clone();
        let renderer: Arc<dyn Renderer> =
            Arc::new(move |mode: RenderMode| seen.lock().unwrap().push(mode));

        let names = vec!["a".to_string(), "b".to_string()];
        RenderPlan::route(Some(&names), RenderReason::SetValue, &re_renders, true)
            .run(Some(&renderer));
        RenderPlan::route(None, RenderReason::SetValue, &re_renders, false).run(Some(&renderer));

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(
            *modes.lock().unwrap(),
            vec![RenderMode::Force, RenderMode::State]
        );
    }

    #[test]
    fn test_empty_name_list_is_global() {
        let re_renders = HashMap::new();
        let plan = RenderPlan::route(Some(&[]), RenderReason::Reset, &re_renders, false);
        assert!(matches!(plan, RenderPlan::Global(RenderMode::State)));
    }
}
