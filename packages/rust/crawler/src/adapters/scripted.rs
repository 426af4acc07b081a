//! Reference [`TreeAdapter`] driven by a [`PlatformProfile`].
//!
//! Every capability is a standalone script evaluated through the injected
//! [`PageController`], with the profile's selectors and the node key inlined
//! as JSON literals. Nothing is installed into the page between calls.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use tocscraper_shared::{Result, ScraperError};

use super::profile::{Fallback, PlatformProfile};
use super::{ExpansionStrategy, NodeInfo, TreeAdapter};
use crate::page::{PageController, decode_json, wait_until};

/// Poll interval while waiting for loading indicators to clear.
const SETTLE_POLL: Duration = Duration::from_millis(250);

/// A [`TreeAdapter`] for any platform described by a [`PlatformProfile`].
pub struct ScriptedAdapter<P> {
    page: P,
    profile: &'static PlatformProfile,
    base: Url,
    /// Node hrefs seen in `node_info`, preferred over synthesized content URLs.
    hrefs: Mutex<HashMap<String, String>>,
}

impl<P: PageController> ScriptedAdapter<P> {
    /// Wrap a page that has already been navigated to `base`.
    pub fn new(page: P, profile: &'static PlatformProfile, base: Url) -> Self {
        Self {
            page,
            profile,
            base,
            hrefs: Mutex::new(HashMap::new()),
        }
    }

    /// Navigate `page` to `url` and wrap it.
    ///
    /// Content URLs are resolved against the URL the page lands on, so a
    /// redirect to a versioned code path is followed by every later
    /// fallback navigation.
    pub async fn open(page: P, profile: &'static PlatformProfile, url: &Url) -> Result<Self> {
        page.navigate(url.as_str()).await?;
        let landed = page.current_url().await?;
        let base = match Url::parse(&landed) {
            Ok(base) => base,
            Err(e) => {
                debug!(%landed, error = %e, "unparseable page URL, keeping requested URL");
                url.clone()
            }
        };
        if base != *url {
            debug!(requested = %url, landed = %base, "entry URL redirected");
        }
        Ok(Self::new(page, profile, base))
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    /// CSS selector for the node carrying `key`.
    fn node_selector(&self, key: &str) -> String {
        format!(
            "{}[{}=\"{}\"]",
            self.profile.node,
            self.profile.key_attr,
            css_string(key)
        )
    }

    /// CSS selector for the content region of `key`.
    fn content_selector(&self, key: &str) -> String {
        self.profile.content.replace("{key}", &css_string(key))
    }

    /// Evaluate a script that returns `JSON.stringify(...)` and decode it.
    async fn eval_json<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        let value = decode_json(self.page.evaluate(script).await?);
        serde_json::from_value(value).map_err(|e| {
            ScraperError::page(format!("unexpected result from {}: {e}", script_label(script)))
        })
    }

    fn root_keys_script(&self) -> String {
        let p = self.profile;
        format!(
            r#"/* root_keys */ (() => {{
  const root = document.querySelector({root});
  if (!root) return JSON.stringify(null);
  const keys = Array.from(root.querySelectorAll({node}))
    .filter((n) => {{
      const owner = n.parentElement && n.parentElement.closest({node});
      return !owner || !root.contains(owner);
    }})
    .map((n) => n.getAttribute({attr}))
    .filter((k) => k);
  return JSON.stringify(keys);
}})()"#,
            root = js(p.root),
            node = js(p.node),
            attr = js(p.key_attr),
        )
    }

    fn collapsed_keys_script(&self) -> String {
        let p = self.profile;
        format!(
            r#"/* collapsed_keys */ (() => {{
  const root = document.querySelector({root});
  if (!root) return JSON.stringify(null);
  const keys = Array.from(root.querySelectorAll({node}))
    .filter((n) => !n.matches({leaf}) && !n.matches({expanded}))
    .map((n) => n.getAttribute({attr}))
    .filter((k) => k);
  return JSON.stringify(keys);
}})()"#,
            root = js(p.root),
            node = js(p.node),
            leaf = js(p.leaf),
            expanded = js(p.expanded),
            attr = js(p.key_attr),
        )
    }

    fn node_info_script(&self, key: &str) -> String {
        let p = self.profile;
        format!(
            r#"/* node_info */ (() => {{
  const el = document.querySelector({sel});
  if (!el) return JSON.stringify(null);
  const label = el.querySelector({title});
  const link = el.querySelector({link});
  const children = Array.from(el.querySelectorAll({node}))
    .filter((n) => n.parentElement.closest({node}) === el);
  return JSON.stringify({{
    title: ((label || el).textContent || '').replace(/\s+/g, ' ').trim(),
    isLeafHint: el.matches({leaf}),
    isExpanded: el.matches({expanded}),
    hasChildrenInDom: children.length > 0,
    href: link && link.href ? link.href : null,
  }});
}})()"#,
            sel = js(&self.node_selector(key)),
            title = js(p.title),
            link = js(p.link),
            node = js(p.node),
            leaf = js(p.leaf),
            expanded = js(p.expanded),
        )
    }

    fn child_keys_script(&self, key: &str) -> String {
        let p = self.profile;
        format!(
            r#"/* child_keys */ (() => {{
  const el = document.querySelector({sel});
  if (!el) return JSON.stringify(null);
  const keys = Array.from(el.querySelectorAll({node}))
    .filter((n) => n.parentElement.closest({node}) === el)
    .map((n) => n.getAttribute({attr}))
    .filter((k) => k);
  return JSON.stringify(keys);
}})()"#,
            sel = js(&self.node_selector(key)),
            node = js(p.node),
            attr = js(p.key_attr),
        )
    }

    fn expand_script(&self, key: &str) -> String {
        let p = self.profile;
        format!(
            r#"/* expand */ (() => {{
  const el = document.querySelector({sel});
  if (!el) return JSON.stringify('missing');
  if (el.matches({expanded})) return JSON.stringify('expanded');
  const toggle = el.querySelector({toggle});
  if (!toggle) return JSON.stringify('no-toggle');
  toggle.click();
  return JSON.stringify('clicked');
}})()"#,
            sel = js(&self.node_selector(key)),
            expanded = js(p.expanded),
            toggle = js(p.toggle),
        )
    }

    fn settled_script(&self) -> String {
        format!(
            "/* settled */ JSON.stringify(document.querySelectorAll({}).length === 0)",
            js(self.profile.loading)
        )
    }

    fn content_present_script(&self, key: &str) -> String {
        format!(
            "/* content_present */ JSON.stringify(document.querySelector({}) !== null)",
            js(&self.content_selector(key))
        )
    }

    fn extract_script(&self, key: &str) -> String {
        format!(
            r#"/* extract */ (() => {{
  const region = document.querySelector({sel});
  return JSON.stringify(region ? region.innerHTML : null);
}})()"#,
            sel = js(&self.content_selector(key)),
        )
    }

    fn dispatch_click_script(&self, key: &str) -> String {
        format!(
            r#"/* dispatch_click */ (() => {{
  const el = document.querySelector({sel});
  const link = el && el.querySelector({link});
  if (!link) return JSON.stringify(false);
  link.dispatchEvent(new MouseEvent('click', {{ bubbles: true, cancelable: true, view: window }}));
  return JSON.stringify(true);
}})()"#,
            sel = js(&self.node_selector(key)),
            link = js(self.profile.link),
        )
    }

    fn hash_script(key: &str) -> String {
        format!(
            "/* set_hash */ (() => {{ window.location.hash = {}; return JSON.stringify(true); }})()",
            js(key)
        )
    }
}

impl<P: PageController> TreeAdapter for ScriptedAdapter<P> {
    fn name(&self) -> &str {
        self.profile.platform.as_str()
    }

    fn strategy(&self) -> ExpansionStrategy {
        self.profile.strategy
    }

    async fn root_keys(&self) -> Result<Vec<String>> {
        let keys: Option<Vec<String>> = self.eval_json(&self.root_keys_script()).await?;
        match keys {
            Some(keys) if !keys.is_empty() => Ok(keys),
            Some(_) => Err(ScraperError::root_not_found(format!(
                "{} contains no {} entries",
                self.profile.root, self.profile.node
            ))),
            None => Err(ScraperError::root_not_found(format!(
                "no element matches {}",
                self.profile.root
            ))),
        }
    }

    async fn collapsed_keys(&self) -> Result<Vec<String>> {
        let keys: Option<Vec<String>> = self.eval_json(&self.collapsed_keys_script()).await?;
        keys.ok_or_else(|| {
            ScraperError::root_not_found(format!("{} disappeared", self.profile.root))
        })
    }

    async fn node_info(&self, key: &str) -> Result<NodeInfo> {
        let info: Option<NodeInfo> = self
            .eval_json(&self.node_info_script(key))
            .await
            .map_err(|e| ScraperError::node_read(key, e.to_string()))?;
        let info = info.ok_or_else(|| ScraperError::node_read(key, "node not in DOM"))?;

        if let Some(href) = &info.href {
            if let Ok(mut hrefs) = self.hrefs.lock() {
                hrefs.insert(key.to_string(), href.clone());
            }
        }
        Ok(info)
    }

    async fn expand(&self, key: &str) -> Result<()> {
        let outcome: String = self.eval_json(&self.expand_script(key)).await?;
        match outcome.as_str() {
            "clicked" | "expanded" => Ok(()),
            "missing" => Err(ScraperError::node_read(key, "node not in DOM")),
            other => Err(ScraperError::page(format!("cannot expand {key}: {other}"))),
        }
    }

    async fn child_keys(&self, key: &str) -> Result<Vec<String>> {
        let keys: Option<Vec<String>> = self.eval_json(&self.child_keys_script(key)).await?;
        keys.ok_or_else(|| ScraperError::node_read(key, "node not in DOM"))
    }

    async fn wait_until_settled(&self, timeout: Duration) -> Result<()> {
        wait_until(
            &self.page,
            &self.settled_script(),
            "TOC loading indicators to clear",
            timeout,
            SETTLE_POLL,
        )
        .await
    }

    async fn content_present(&self, key: &str) -> Result<bool> {
        self.eval_json(&self.content_present_script(key)).await
    }

    async fn activate(&self, key: &str) -> Result<()> {
        let selector = format!("{} {}", self.node_selector(key), self.profile.link);
        self.page.click(&selector).await
    }

    async fn activate_fallback(&self, key: &str) -> Result<()> {
        match self.profile.fallback {
            Fallback::Navigate => {
                let url = self.build_content_url(key).ok_or_else(|| {
                    ScraperError::page(format!("no content URL for {key}"))
                })?;
                debug!(%key, %url, "fallback navigation");
                self.page.navigate(&url).await
            }
            Fallback::Hash => {
                self.page.evaluate(&Self::hash_script(key)).await?;
                Ok(())
            }
            Fallback::DispatchClick => {
                let clicked: bool = self.eval_json(&self.dispatch_click_script(key)).await?;
                if clicked {
                    Ok(())
                } else {
                    Err(ScraperError::node_read(key, "no link to dispatch a click on"))
                }
            }
        }
    }

    async fn wait_for_content(&self, key: &str, timeout: Duration) -> Result<()> {
        self.page
            .wait_for_selector(&self.content_selector(key), timeout)
            .await
    }

    async fn extract_leaf_content(&self, key: &str) -> Result<Option<String>> {
        self.eval_json(&self.extract_script(key)).await
    }

    fn build_content_url(&self, key: &str) -> Option<String> {
        let known = self
            .hrefs
            .lock()
            .ok()
            .and_then(|hrefs| hrefs.get(key).cloned());
        if let Some(href) = known {
            if let Ok(url) = self.base.join(&href) {
                return Some(url.to_string());
            }
        }
        self.profile
            .content_url
            .build(&self.base, key)
            .map(|u| u.to_string())
    }
}

/// Encode a string as a JavaScript string literal.
fn js(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Escape a value for use inside a double-quoted CSS attribute selector.
fn css_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\a "),
            _ => out.push(c),
        }
    }
    out
}

/// The `/* name */` tag at the start of a generated script.
fn script_label(script: &str) -> &str {
    script
        .strip_prefix("/* ")
        .and_then(|rest| rest.split_once(" */"))
        .map_or("script", |(label, _)| label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::profile_for;
    use crate::testing::MockPage;
    use serde_json::json;
    use tocscraper_shared::Platform;

    fn adapter(page: MockPage, platform: Platform) -> ScriptedAdapter<MockPage> {
        let base = Url::parse("https://library.example.com/ca/town/codes/code").unwrap();
        ScriptedAdapter::new(page, profile_for(platform), base)
    }

    #[test]
    fn selectors_escape_keys() {
        let a = adapter(MockPage::new(|_| Value::Null), Platform::Municode);
        assert_eq!(
            a.node_selector(r#"CH"1"#),
            r#"li.toc-item[data-node-id="CH\"1"]"#
        );
        assert_eq!(
            a.content_selector("S-2"),
            r#"#codesContent .chunk[data-node-id="S-2"]"#
        );
    }

    #[test]
    fn scripts_inline_keys_as_json_literals() {
        let a = adapter(MockPage::new(|_| Value::Null), Platform::AmLegal);
        let script = a.child_keys_script("a'b");
        assert!(script.starts_with("/* child_keys */"));
        assert!(script.contains(r#"li.toc-entry[data-doc-id=\"a'b\"]"#));
        assert_eq!(script_label(&script), "child_keys");
    }

    #[tokio::test]
    async fn missing_root_is_root_not_found() {
        let a = adapter(MockPage::new(|_| json!("null")), Platform::AmLegal);
        let err = a.root_keys().await.expect_err("no root");
        assert!(err.is_structural());
    }

    #[tokio::test]
    async fn empty_root_is_root_not_found() {
        let a = adapter(MockPage::new(|_| json!("[]")), Platform::AmLegal);
        assert!(a.root_keys().await.expect_err("empty root").is_structural());
    }

    #[tokio::test]
    async fn node_info_caches_href_for_content_url() {
        let page = MockPage::new(|script| {
            if script.starts_with("/* node_info */") {
                json!(
                    r#"{"title":"Sec. 1","isLeafHint":true,"isExpanded":false,"hasChildrenInDom":false,"href":"/ca/town/codes/code?nodeId=S1"}"#
                )
            } else {
                Value::Null
            }
        });
        let a = adapter(page, Platform::Municode);

        let synthesized = a.build_content_url("S1").unwrap();
        assert_eq!(
            synthesized,
            "https://library.example.com/ca/town/codes/code?nodeId=S1"
        );

        let info = a.node_info("S1").await.expect("node info");
        assert_eq!(info.title, "Sec. 1");
        assert!(info.is_leaf_hint);
        assert_eq!(
            a.build_content_url("S1").unwrap(),
            "https://library.example.com/ca/town/codes/code?nodeId=S1"
        );
    }

    #[tokio::test]
    async fn node_info_for_detached_node_is_node_read() {
        let a = adapter(MockPage::new(|_| json!("null")), Platform::Municode);
        let err = a.node_info("gone").await.expect_err("detached");
        assert!(matches!(err, ScraperError::NodeRead { .. }));
    }

    #[tokio::test]
    async fn expand_reports_missing_toggle() {
        let a = adapter(MockPage::new(|_| json!("\"no-toggle\"")), Platform::AmLegal);
        assert!(a.expand("k").await.is_err());

        let a = adapter(MockPage::new(|_| json!("\"expanded\"")), Platform::AmLegal);
        a.expand("k").await.expect("already expanded is a no-op");
    }

    #[tokio::test]
    async fn activate_clicks_node_link() {
        let a = adapter(MockPage::new(|_| Value::Null), Platform::AmLegal);
        a.activate("D1").await.expect("click");
        assert_eq!(
            a.page().clicks(),
            vec![r#"li.toc-entry[data-doc-id="D1"] a.toc-entry__link"#.to_string()]
        );
    }

    #[tokio::test]
    async fn fallbacks_use_a_different_trigger() {
        let a = adapter(MockPage::new(|_| Value::Null), Platform::Municode);
        a.activate_fallback("S9").await.expect("navigate");
        assert_eq!(
            a.page().navigations(),
            vec!["https://library.example.com/ca/town/codes/code?nodeId=S9".to_string()]
        );
        assert!(a.page().clicks().is_empty());

        let a = adapter(MockPage::new(|_| json!("true")), Platform::MunicipalCodeOnline);
        a.activate_fallback("sec_12").await.expect("hash");
        assert!(a.page().scripts()[0].contains(r#"window.location.hash = "sec_12""#));

        let a = adapter(MockPage::new(|_| json!("false")), Platform::GeneralCodePublish);
        assert!(a.activate_fallback("x").await.is_err());
    }

    #[tokio::test]
    async fn open_resolves_content_urls_against_landed_url() {
        let page = MockPage::new(|_| Value::Null)
            .redirect_to("https://library.example.com/ca/town/codes/code_v2");
        let entry = Url::parse("https://library.example.com/ca/town/codes/code").unwrap();
        let a = ScriptedAdapter::open(page, profile_for(Platform::Municode), &entry)
            .await
            .expect("open");

        assert_eq!(a.page().navigations(), vec![entry.to_string()]);
        assert_eq!(
            a.build_content_url("S1").unwrap(),
            "https://library.example.com/ca/town/codes/code_v2?nodeId=S1"
        );
    }

    #[tokio::test]
    async fn open_without_redirect_keeps_entry_url() {
        let entry = Url::parse("https://library.example.com/ca/town/codes/code").unwrap();
        let a = ScriptedAdapter::open(
            MockPage::new(|_| Value::Null),
            profile_for(Platform::Municode),
            &entry,
        )
        .await
        .expect("open");
        assert_eq!(
            a.build_content_url("S1").unwrap(),
            "https://library.example.com/ca/town/codes/code?nodeId=S1"
        );
    }

    #[tokio::test]
    async fn wait_for_content_uses_content_selector() {
        let page = MockPage::new(|_| Value::Null)
            .with_present(r#"#codecontent .rbox[data-doc-id="D1"]"#);
        let a = adapter(page, Platform::AmLegal);
        a.wait_for_content("D1", Duration::from_millis(10))
            .await
            .expect("present");
        let err = a
            .wait_for_content("D2", Duration::from_millis(10))
            .await
            .expect_err("absent");
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn extract_returns_inner_html() {
        let a = adapter(
            MockPage::new(|_| json!(r#""<p>Text</p>""#)),
            Platform::AmLegal,
        );
        assert_eq!(
            a.extract_leaf_content("D1").await.unwrap().as_deref(),
            Some("<p>Text</p>")
        );
    }
}
