//! Link signal collection for a single page.
//!
//! The collector never touches a real DOM. It reads through [`PageDom`], so
//! a content script, a headless renderer or a test fixture can all drive it.
//! Observations are owned by one page and discarded with it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::{AnalysisConfig, CLICK_CONFIDENCE};
use crate::types::PrefetchCandidate;

/// Opaque handle to an anchor element, assigned by the [`PageDom`].
pub type ElementId = u64;

/// A bounding box in viewport coordinates (CSS pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// An anchor element as enumerated by the DOM.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub id: ElementId,
    /// Resolved absolute href, if the element has one.
    pub href: Option<String>,
    pub text: String,
    /// Inside a heading or header container.
    pub near_heading: bool,
    /// Inside the page's main content container.
    pub in_main_content: bool,
}

/// Read-only DOM capabilities the collector depends on.
pub trait PageDom {
    /// URL of the document being analyzed.
    fn page_url(&self) -> String;

    fn viewport(&self) -> Viewport;

    /// All anchor elements currently in the document, in document order.
    fn anchors(&self) -> Vec<Anchor>;

    /// Current bounding box, or `None` once the element is detached.
    fn bounding_rect(&self, id: ElementId) -> Option<Rect>;

    /// Whether the element participates in layout (not `display: none`).
    fn is_rendered(&self, _id: ElementId) -> bool {
        true
    }

    fn scroll_y(&self) -> f64;

    fn document_height(&self) -> f64;
}

/// Signals observed for one link URL on the current page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkObservation {
    #[serde(skip)]
    pub element: ElementId,
    pub visible: bool,
    /// Centre of the link relative to the viewport, clamped to `[0, 1]²`.
    pub relative_position: (f64, f64),
    /// Link area as a fraction of the viewport area.
    pub relative_area: f64,
    pub click_count: u32,
    pub hover_count: u32,
    pub first_seen: u64,
    pub near_heading: bool,
    pub in_main_content: bool,
    pub anchor_text: String,
    /// False once the element has left the document.
    pub attached: bool,
}

/// Whether an href is worth tracking as a navigation target.
///
/// Accepts absolute http(s) URLs that do not merely point at a fragment of
/// the current document.
pub fn is_prefetchable_href(href: &str, page_url: &str) -> bool {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return false;
    }
    if href
        .get(..11)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("javascript:"))
    {
        return false;
    }

    let Ok(target) = url::Url::parse(href) else {
        return false;
    };
    if !matches!(target.scheme(), "http" | "https") {
        return false;
    }

    if target.fragment().is_some() {
        if let Ok(mut page) = url::Url::parse(page_url) {
            let mut bare = target.clone();
            bare.set_fragment(None);
            page.set_fragment(None);
            if bare == page {
                return false;
            }
        }
    }
    true
}

/// Whether the element is at least `threshold` inside the viewport.
pub fn is_visible(rect: &Rect, viewport: &Viewport, rendered: bool, threshold: f64) -> bool {
    if !rendered || rect.width <= 0.0 || rect.height <= 0.0 {
        return false;
    }

    if rect.bottom() < 0.0
        || rect.top > viewport.height
        || rect.right() < 0.0
        || rect.left > viewport.width
    {
        return false;
    }

    let visible_h = rect.bottom().min(viewport.height) - rect.top.max(0.0);
    let visible_w = rect.right().min(viewport.width) - rect.left.max(0.0);
    if visible_h <= 0.0 || visible_w <= 0.0 {
        return false;
    }

    (visible_h * visible_w) / rect.area() >= threshold
}

fn relative_position(rect: &Rect, viewport: &Viewport) -> (f64, f64) {
    if viewport.width <= 0.0 || viewport.height <= 0.0 {
        return (0.0, 0.0);
    }
    let x = (rect.left + rect.right()) / 2.0 / viewport.width;
    let y = (rect.top + rect.bottom()) / 2.0 / viewport.height;
    (x.clamp(0.0, 1.0), y.clamp(0.0, 1.0))
}

fn relative_area(rect: &Rect, viewport: &Viewport) -> f64 {
    let vp = viewport.area();
    if vp <= 0.0 {
        return 0.0;
    }
    rect.area().max(0.0) / vp
}

/// Tracks the links on one page and the interaction signals on them.
pub struct LinkCollector {
    config: AnalysisConfig,
    links: Vec<(String, LinkObservation)>,
    index: HashMap<String, usize>,
    /// Pending hover timers: URL → deadline (ms).
    hover_timers: HashMap<String, u64>,
}

impl LinkCollector {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            links: Vec::new(),
            index: HashMap::new(),
            hover_timers: HashMap::new(),
        }
    }

    /// Enumerate anchors and add one observation per new URL.
    ///
    /// A full pass (`incremental == false`) drops previous observations
    /// first. Returns the number of observations added.
    pub fn collect(&mut self, dom: &dyn PageDom, now: u64, incremental: bool) -> usize {
        if !incremental {
            self.links.clear();
            self.index.clear();
        }

        let page_url = dom.page_url();
        let viewport = dom.viewport();
        let mut added = 0;

        for anchor in dom.anchors() {
            let Some(href) = anchor.href.as_deref() else {
                continue;
            };
            if !is_prefetchable_href(href, &page_url) || self.index.contains_key(href) {
                continue;
            }

            let Some(rect) = dom.bounding_rect(anchor.id) else {
                continue;
            };

            let observation = LinkObservation {
                element: anchor.id,
                visible: is_visible(
                    &rect,
                    &viewport,
                    dom.is_rendered(anchor.id),
                    self.config.visible_threshold,
                ),
                relative_position: relative_position(&rect, &viewport),
                relative_area: relative_area(&rect, &viewport),
                click_count: 0,
                hover_count: 0,
                first_seen: now,
                near_heading: anchor.near_heading,
                in_main_content: anchor.in_main_content,
                anchor_text: anchor.text.trim().to_string(),
                attached: true,
            };

            self.index.insert(href.to_string(), self.links.len());
            self.links.push((href.to_string(), observation));
            added += 1;
        }

        if added > 0 {
            tracing::debug!(
                "Collected {added} link(s) ({} tracked, incremental: {incremental})",
                self.links.len()
            );
        }
        added
    }

    /// Re-evaluate visibility and position of every tracked link in place.
    pub fn refresh(&mut self, dom: &dyn PageDom) {
        let viewport = dom.viewport();
        let threshold = self.config.visible_threshold;

        for (_, obs) in self.links.iter_mut() {
            match dom.bounding_rect(obs.element) {
                Some(rect) => {
                    obs.attached = true;
                    obs.visible = is_visible(&rect, &viewport, dom.is_rendered(obs.element), threshold);
                    obs.relative_position = relative_position(&rect, &viewport);
                }
                None => {
                    obs.attached = false;
                    obs.visible = false;
                }
            }
        }
    }

    /// Count a click. Tracked links are escalated immediately as a
    /// high-confidence candidate.
    pub fn record_click(&mut self, url: &str) -> Option<PrefetchCandidate> {
        let obs = self.get_mut(url)?;
        obs.click_count += 1;
        Some(PrefetchCandidate::new(url, CLICK_CONFIDENCE))
    }

    /// Start (or restart) the hover timer for `url`.
    pub fn hover_start(&mut self, url: &str, now: u64) {
        let deadline = now + self.config.hover_threshold_ms;
        self.hover_timers.insert(url.to_string(), deadline);
    }

    /// Cancel the pending hover timer for `url`, if any.
    pub fn hover_end(&mut self, url: &str) -> bool {
        self.hover_timers.remove(url).is_some()
    }

    /// Fire hover timers whose deadline has passed. Returns the tracked URLs
    /// whose hover count was incremented.
    pub fn fire_due_hovers(&mut self, now: u64) -> Vec<String> {
        let mut due: Vec<(String, u64)> = self
            .hover_timers
            .iter()
            .filter(|(_, &deadline)| deadline <= now)
            .map(|(url, &deadline)| (url.clone(), deadline))
            .collect();
        due.sort_by_key(|(_, deadline)| *deadline);

        let mut fired = Vec::new();
        for (url, _) in due {
            self.hover_timers.remove(&url);
            if let Some(obs) = self.get_mut(&url) {
                obs.hover_count += 1;
                fired.push(url);
            }
        }
        fired
    }

    pub fn pending_hover_count(&self) -> usize {
        self.hover_timers.len()
    }

    /// Drop all hover timers (page unload).
    pub fn cancel_all_hovers(&mut self) {
        self.hover_timers.clear();
    }

    /// Drop everything (page unload).
    pub fn clear(&mut self) {
        self.links.clear();
        self.index.clear();
        self.hover_timers.clear();
    }

    pub fn get(&self, url: &str) -> Option<&LinkObservation> {
        self.index.get(url).map(|&i| &self.links[i].1)
    }

    fn get_mut(&mut self, url: &str) -> Option<&mut LinkObservation> {
        let i = *self.index.get(url)?;
        Some(&mut self.links[i].1)
    }

    /// Observations in collection order.
    pub fn observations(&self) -> impl Iterator<Item = (&str, &LinkObservation)> {
        self.links.iter().map(|(url, obs)| (url.as_str(), obs))
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
