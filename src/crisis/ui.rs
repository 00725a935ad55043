// UI capability used by the guard
//
// The guard only talks to this trait. It never looks up markup, so a
// host that forgot to include the modal cannot silently lose the response.

use std::sync::Mutex;

use super::resources::{ActionKind, CrisisModal, LockNotice};

pub trait CrisisUi: Send + Sync {
    /// Open the crisis-resources modal (clears its aria-hidden state)
    fn show_modal(&self, modal: &CrisisModal);

    /// Move keyboard focus to one of the modal's controls
    fn focus_action(&self, action: ActionKind);

    /// Close the modal (sets its aria-hidden state)
    fn hide_modal(&self);

    /// Make every navigation control inert and show the blocking overlay
    fn lock_navigation(&self, notice: &LockNotice);

    /// Undo `lock_navigation` completely
    fn unlock_navigation(&self);

    fn show_banner(&self, text: &str);

    fn hide_banner(&self);

    /// Native intent such as `tel:988`
    fn open_uri(&self, uri: &str);

    /// External page in a new tab
    fn open_external(&self, url: &str);

    fn show_dialog(&self, text: &str);
}

/// A navigation control on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavControl {
    pub id: String,
    pub href: String,
    pub inert: bool,
    pub title: Option<String>,
}

impl NavControl {
    pub fn new(id: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            href: href.into(),
            inert: false,
            title: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModalView {
    pub open: bool,
    pub aria_hidden: bool,
    pub focused: Option<ActionKind>,
    pub actions: Vec<ActionKind>,
}

/// Anything the page sent outward: intents, tabs, dialogs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEffect {
    Uri(String),
    External(String),
    Dialog(String),
}

#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub controls: Vec<NavControl>,
    pub overlay: Option<LockNotice>,
    pub banner: Option<String>,
    pub modal: ModalView,
    pub effects: Vec<PageEffect>,
}

impl PageSnapshot {
    pub fn is_locked(&self) -> bool {
        self.overlay.is_some()
    }

    pub fn inert_count(&self) -> usize {
        self.controls.iter().filter(|c| c.inert).count()
    }
}

#[derive(Debug, Default)]
struct PageInner {
    page: PageSnapshot,
    /// Control states captured by the first lock, restored on unlock
    saved: Option<Vec<(bool, Option<String>)>>,
}

/// In-memory page model.
///
/// Used by the CLI to render the guard's effects and by tests to check them.
#[derive(Debug)]
pub struct HeadlessPage {
    inner: Mutex<PageInner>,
}

impl Default for HeadlessPage {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl HeadlessPage {
    pub fn new(controls: Vec<NavControl>) -> Self {
        Self {
            inner: Mutex::new(PageInner {
                page: PageSnapshot {
                    controls,
                    modal: ModalView {
                        aria_hidden: true,
                        ..ModalView::default()
                    },
                    ..PageSnapshot::default()
                },
                saved: None,
            }),
        }
    }

    /// A lesson page with the usual course navigation
    pub fn lesson_page() -> Self {
        Self::new(vec![
            NavControl::new("nav-home", "../index.html"),
            NavControl::new("nav-prev", "pages/lesson-1.html"),
            NavControl::new("nav-next", "pages/lesson-3.html"),
            NavControl::new("btn-continue", "pages/lesson-3.html"),
        ])
    }

    pub fn snapshot(&self) -> PageSnapshot {
        self.with(|inner| inner.page.clone())
    }

    fn with<T>(&self, f: impl FnOnce(&mut PageInner) -> T) -> T {
        // Poisoned state is still usable; keep serving it
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl CrisisUi for HeadlessPage {
    fn show_modal(&self, modal: &CrisisModal) {
        self.with(|inner| {
            let view = &mut inner.page.modal;
            view.open = true;
            view.aria_hidden = false;
            view.actions = modal.actions().to_vec();
        });
    }

    fn focus_action(&self, action: ActionKind) {
        self.with(|inner| {
            if inner.page.modal.open {
                inner.page.modal.focused = Some(action);
            }
        });
    }

    fn hide_modal(&self) {
        self.with(|inner| {
            let view = &mut inner.page.modal;
            view.open = false;
            view.aria_hidden = true;
            view.focused = None;
        });
    }

    fn lock_navigation(&self, notice: &LockNotice) {
        self.with(|inner| {
            if inner.saved.is_none() {
                inner.saved = Some(
                    inner
                        .page
                        .controls
                        .iter()
                        .map(|c| (c.inert, c.title.clone()))
                        .collect(),
                );
            }
            for control in &mut inner.page.controls {
                control.inert = true;
                control.title = Some(notice.control_hint.clone());
            }
            inner.page.overlay = Some(notice.clone());
        });
    }

    fn unlock_navigation(&self) {
        self.with(|inner| {
            if let Some(saved) = inner.saved.take() {
                for (control, (inert, title)) in inner.page.controls.iter_mut().zip(saved) {
                    control.inert = inert;
                    control.title = title;
                }
            }
            inner.page.overlay = None;
        });
    }

    fn show_banner(&self, text: &str) {
        self.with(|inner| inner.page.banner = Some(text.to_string()));
    }

    fn hide_banner(&self) {
        self.with(|inner| inner.page.banner = None);
    }

    fn open_uri(&self, uri: &str) {
        self.with(|inner| inner.page.effects.push(PageEffect::Uri(uri.to_string())));
    }

    fn open_external(&self, url: &str) {
        self.with(|inner| inner.page.effects.push(PageEffect::External(url.to_string())));
    }

    fn show_dialog(&self, text: &str) {
        self.with(|inner| inner.page.effects.push(PageEffect::Dialog(text.to_string())));
    }
}
