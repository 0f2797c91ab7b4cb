//! Playwright browser automation
//!
//! A single `node` process runs a generated driver script and keeps the
//! browser alive for the whole run. Requests and responses are one JSON
//! object per line over the child's stdin/stdout.

use std::cmp::Ordering as CmpOrdering;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::browser::{Automation, Browser, BrowserContext, BrowserPage, ContextOptions};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};

const DRIVER_TEMPLATE: &str = r#"
const playwright = require('playwright');
const readline = require('readline');

const contexts = new Map();
const pages = new Map();
let nextHandle = 0;
const handle = (kind) => `${kind}-${++nextHandle}`;
const send = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

const lookup = (map, id) => {
  const value = map.get(id);
  if (!value) throw new Error(`unknown handle ${id}`);
  return value;
};

(async () => {
  const browser = await playwright['__BROWSER__'].launch({ headless: __HEADLESS__, args: __ARGS__ });
  const page = (a) => lookup(pages, a.page);

  const commands = {
    newContext: async (a) => {
      const context = await browser.newContext({
        viewport: a.viewport,
        ignoreHTTPSErrors: a.ignoreHttpsErrors,
        recordVideo: a.recordVideoDir ? { dir: a.recordVideoDir, size: a.viewport } : undefined,
      });
      const id = handle('context');
      contexts.set(id, context);
      return id;
    },
    newPage: async (a) => {
      const created = await lookup(contexts, a.context).newPage();
      const id = handle('page');
      pages.set(id, created);
      return id;
    },
    url: async (a) => page(a).url(),
    goto: async (a) => { await page(a).goto(a.url, { timeout: a.timeout }); return null; },
    click: async (a) => { await page(a).locator(a.selector).first().click({ timeout: a.timeout }); return null; },
    fill: async (a) => { await page(a).locator(a.selector).first().fill(a.value); return null; },
    textContent: async (a) => {
      const located = page(a).locator(a.selector);
      return (await located.count()) > 0 ? await located.first().textContent() : null;
    },
    count: async (a) => page(a).locator(a.selector).count(),
    screenshot: async (a) => { await page(a).screenshot({ path: a.path }); return a.path; },
    videoPath: async (a) => {
      const video = page(a).video();
      return video ? await video.path() : null;
    },
    closePage: async (a) => { await page(a).close(); pages.delete(a.page); return null; },
    closeContext: async (a) => {
      await lookup(contexts, a.context).close();
      contexts.delete(a.context);
      return null;
    },
    closeBrowser: async () => { await browser.close(); return null; },
  };

  send({ ready: true });

  const lines = readline.createInterface({ input: process.stdin });
  for await (const line of lines) {
    if (!line.trim()) continue;
    const request = JSON.parse(line);
    try {
      const command = commands[request.cmd];
      if (!command) throw new Error(`unknown command ${request.cmd}`);
      const result = await command(request.args || {});
      send({ id: request.id, ok: true, result: result === undefined ? null : result });
    } catch (error) {
      send({ id: request.id, ok: false, error: { name: error.name, message: error.message } });
    }
  }
})().catch((error) => {
  console.error(error && error.stack ? error.stack : String(error));
  process.exit(1);
});
"#;

/// Configuration for the Playwright driver process
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    /// Browser launch arguments
    pub launch_args: Vec<String>,
    pub node_binary: String,
    /// `NODE_PATH` for resolving the `playwright` package
    pub node_path: Option<String>,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            launch_args: vec!["--window-size=1920,1080".to_string()],
            node_binary: "node".to_string(),
            node_path: std::env::var("NODE_PATH").ok(),
        }
    }
}

impl PlaywrightConfig {
    pub fn from_harness(config: &HarnessConfig) -> Self {
        Self {
            browser: config.browser,
            headless: config.headless,
            ..Self::default()
        }
    }

    /// Driver script with browser, headless flag and launch arguments filled in
    pub fn render_driver(&self) -> HarnessResult<String> {
        Ok(DRIVER_TEMPLATE
            .replace("__BROWSER__", self.browser.as_str())
            .replace("__HEADLESS__", if self.headless { "true" } else { "false" })
            .replace("__ARGS__", &serde_json::to_string(&self.launch_args)?))
    }
}

#[derive(Debug, Serialize)]
struct DriverRequest<'a> {
    id: u64,
    cmd: &'a str,
    args: Value,
}

#[derive(Debug, Deserialize)]
struct DriverResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    error: Option<DriverError>,
}

#[derive(Debug, Deserialize)]
struct DriverError {
    name: String,
    message: String,
}

impl DriverResponse {
    /// Command result carried by the response
    fn into_result(self) -> HarnessResult<Value> {
        if self.ok {
            return Ok(self.result);
        }
        match self.error {
            Some(err) if err.name == "TimeoutError" => Err(HarnessError::Timeout(err.message)),
            Some(err) => Err(HarnessError::Automation(format!("{}: {}", err.name, err.message))),
            None => Err(HarnessError::Automation("Driver reported failure without an error".into())),
        }
    }
}

#[derive(Debug)]
enum ResponseMatch {
    /// Answer to an earlier request whose caller stopped waiting
    Stale(u64),
    Current(HarnessResult<Value>),
}

/// Decode one driver response line against the pending request id.
///
/// `Err` means the stream can no longer be trusted.
fn match_response(line: &str, expected_id: u64) -> HarnessResult<ResponseMatch> {
    let response: DriverResponse = serde_json::from_str(line)?;
    match response.id.cmp(&expected_id) {
        CmpOrdering::Less => Ok(ResponseMatch::Stale(response.id)),
        CmpOrdering::Equal => Ok(ResponseMatch::Current(response.into_result())),
        CmpOrdering::Greater => Err(HarnessError::Automation(format!(
            "Driver answered request {} while {} was pending",
            response.id, expected_id
        ))),
    }
}

/// Read until the response to `expected_id` arrives, skipping stale ones.
///
/// The outer result is the protocol state, the inner one the command result.
async fn read_response<R>(
    lines: &mut Lines<R>,
    cmd: &str,
    expected_id: u64,
) -> HarnessResult<HarnessResult<Value>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let Some(line) = lines.next_line().await? else {
            return Err(HarnessError::Automation(format!(
                "Driver exited while handling '{}'",
                cmd
            )));
        };
        match match_response(&line, expected_id)? {
            ResponseMatch::Stale(id) => warn!("Discarding stale driver response {}", id),
            ResponseMatch::Current(result) => return Ok(result),
        }
    }
}

struct DriverIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

struct BridgeInner {
    io: Mutex<DriverIo>,
    next_id: AtomicU64,
    /// Set once a response could not be paired with its request
    out_of_sync: AtomicBool,
    _child: Mutex<Child>,
    _script_dir: TempDir,
}

/// Handle to the running driver; cheap to clone
#[derive(Clone)]
pub struct PlaywrightBridge {
    inner: Arc<BridgeInner>,
}

impl PlaywrightBridge {
    /// Check Playwright, write the driver script and launch the browser
    pub async fn launch(config: PlaywrightConfig) -> HarnessResult<Self> {
        Self::check_playwright_installed()?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("driver.js");
        std::fs::write(&script_path, config.render_driver()?)?;

        debug!("Starting Playwright driver: {}", script_path.display());

        let mut command = TokioCommand::new(&config.node_binary);
        command
            .arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(node_path) = &config.node_path {
            command.env("NODE_PATH", node_path);
        }

        let mut child = command.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HarnessError::Automation("Driver stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::Automation("Driver stdout unavailable".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("[playwright] {}", line);
                }
            });
        }

        let mut stdout = BufReader::new(stdout).lines();
        match stdout.next_line().await? {
            Some(line) if line.contains("\"ready\"") => {}
            Some(line) => {
                return Err(HarnessError::Automation(format!(
                    "Unexpected driver greeting: {}",
                    line
                )))
            }
            None => {
                return Err(HarnessError::Automation(format!(
                    "Driver exited before {} launched",
                    config.browser
                )))
            }
        }

        info!(
            "Launched {} (headless: {})",
            config.browser, config.headless
        );

        Ok(Self {
            inner: Arc::new(BridgeInner {
                io: Mutex::new(DriverIo { stdin, stdout }),
                next_id: AtomicU64::new(1),
                out_of_sync: AtomicBool::new(false),
                _child: Mutex::new(child),
                _script_dir: script_dir,
            }),
        })
    }

    fn check_playwright_installed() -> HarnessResult<()> {
        let status = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(HarnessError::Automation(
                "Playwright not found. Install with: npm install -D playwright && npx playwright install"
                    .into(),
            )),
        }
    }

    async fn request(&self, cmd: &str, args: Value) -> HarnessResult<Value> {
        if self.inner.out_of_sync.load(Ordering::Acquire) {
            return Err(HarnessError::Automation(format!(
                "Driver protocol out of sync; '{}' not sent",
                cmd
            )));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut line = serde_json::to_string(&DriverRequest { id, cmd, args })?;
        line.push('\n');

        let mut io = self.inner.io.lock().await;
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.flush().await?;

        match read_response(&mut io.stdout, cmd, id).await {
            Ok(result) => result,
            Err(e) => {
                self.inner.out_of_sync.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    async fn request_handle(&self, cmd: &str, args: Value) -> HarnessResult<String> {
        match self.request(cmd, args).await? {
            Value::String(id) => Ok(id),
            other => Err(HarnessError::Automation(format!(
                "Driver returned {} for '{}' instead of a handle",
                other, cmd
            ))),
        }
    }
}

#[async_trait]
impl Automation for PlaywrightBridge {
    async fn open_context(&self, options: ContextOptions) -> HarnessResult<Box<dyn BrowserContext>> {
        let id = self
            .request_handle(
                "newContext",
                json!({
                    "viewport": options.viewport,
                    "recordVideoDir": options.record_video_dir,
                    "ignoreHttpsErrors": options.ignore_https_errors,
                }),
            )
            .await?;
        Ok(Box::new(PlaywrightContext {
            bridge: self.clone(),
            id,
        }))
    }

    async fn close(&self) -> HarnessResult<()> {
        self.request("closeBrowser", json!({})).await?;
        Ok(())
    }
}

pub struct PlaywrightContext {
    bridge: PlaywrightBridge,
    id: String,
}

#[async_trait]
impl BrowserContext for PlaywrightContext {
    async fn new_page(&self) -> HarnessResult<Arc<dyn BrowserPage>> {
        let id = self
            .bridge
            .request_handle("newPage", json!({ "context": self.id }))
            .await?;
        Ok(Arc::new(PlaywrightPage {
            bridge: self.bridge.clone(),
            id,
        }))
    }

    async fn close(&self) -> HarnessResult<()> {
        self.bridge
            .request("closeContext", json!({ "context": self.id }))
            .await?;
        Ok(())
    }
}

pub struct PlaywrightPage {
    bridge: PlaywrightBridge,
    id: String,
}

impl PlaywrightPage {
    async fn call(&self, cmd: &str, mut args: Value) -> HarnessResult<Value> {
        if let Value::Object(map) = &mut args {
            map.insert("page".into(), Value::String(self.id.clone()));
        }
        self.bridge.request(cmd, args).await
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

#[async_trait]
impl BrowserPage for PlaywrightPage {
    async fn url(&self) -> HarnessResult<String> {
        match self.call("url", json!({})).await? {
            Value::String(url) => Ok(url),
            other => Err(HarnessError::Automation(format!("Unexpected url: {}", other))),
        }
    }

    async fn goto(&self, url: &str, timeout: Duration) -> HarnessResult<()> {
        self.call("goto", json!({ "url": url, "timeout": millis(timeout) }))
            .await?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> HarnessResult<PathBuf> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.call("screenshot", json!({ "path": path })).await?;
        Ok(path.to_path_buf())
    }

    async fn video_path(&self) -> HarnessResult<Option<PathBuf>> {
        Ok(self
            .call("videoPath", json!({}))
            .await?
            .as_str()
            .map(PathBuf::from))
    }

    async fn click(&self, selector: &str, timeout: Duration) -> HarnessResult<()> {
        self.call(
            "click",
            json!({ "selector": selector, "timeout": millis(timeout) }),
        )
        .await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> HarnessResult<()> {
        self.call("fill", json!({ "selector": selector, "value": value }))
            .await?;
        Ok(())
    }

    async fn text_content(&self, selector: &str) -> HarnessResult<Option<String>> {
        Ok(self
            .call("textContent", json!({ "selector": selector }))
            .await?
            .as_str()
            .map(String::from))
    }

    async fn locator_count(&self, selector: &str) -> HarnessResult<usize> {
        let count = self.call("count", json!({ "selector": selector })).await?;
        count
            .as_u64()
            .map(|c| c as usize)
            .ok_or_else(|| HarnessError::Automation(format!("Unexpected count: {}", count)))
    }

    async fn close(&self) -> HarnessResult<()> {
        self.call("closePage", json!({})).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_driver() {
        let config = PlaywrightConfig {
            browser: Browser::Firefox,
            headless: false,
            ..PlaywrightConfig::default()
        };
        let script = config.render_driver().unwrap();
        assert!(script.contains("playwright['firefox'].launch({ headless: false, args: [\"--window-size=1920,1080\"] })"));
        assert!(!script.contains("__BROWSER__"));
        assert!(!script.contains("__ARGS__"));
    }

    #[test]
    fn test_from_harness() {
        let harness = HarnessConfig {
            browser: Browser::Webkit,
            headless: true,
            ..HarnessConfig::default()
        };
        let config = PlaywrightConfig::from_harness(&harness);
        assert_eq!(config.browser, Browser::Webkit);
        assert!(config.headless);
    }

    fn current(line: &str, id: u64) -> HarnessResult<Value> {
        match match_response(line, id).unwrap() {
            ResponseMatch::Current(result) => result,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ok_response() {
        assert_eq!(current(r#"{"id":3,"ok":true,"result":"page-2"}"#, 3).unwrap(), json!("page-2"));
        assert!(current(r#"{"id":4,"ok":true}"#, 4).unwrap().is_null());
    }

    #[test]
    fn test_timeout_response() {
        let err = current(
            r#"{"id":1,"ok":false,"error":{"name":"TimeoutError","message":"page.goto: Timeout 60000ms exceeded"}}"#,
            1,
        )
        .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_error_response() {
        let err = current(
            r#"{"id":1,"ok":false,"error":{"name":"Error","message":"unknown handle page-9"}}"#,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, HarnessError::Automation(m) if m.contains("unknown handle")));
    }

    #[test]
    fn test_older_response_is_stale_and_newer_is_fatal() {
        assert!(matches!(
            match_response(r#"{"id":1,"ok":true,"result":null}"#, 2).unwrap(),
            ResponseMatch::Stale(1)
        ));
        assert!(match_response(r#"{"id":3,"ok":true,"result":null}"#, 2).is_err());
        assert!(match_response("not json", 2).is_err());
    }

    #[tokio::test]
    async fn test_read_response_skips_stale_answers() {
        let stream: &[u8] = b"{\"id\":4,\"ok\":true,\"result\":\"late\"}\n{\"id\":5,\"ok\":true,\"result\":7}\n";
        let mut lines = BufReader::new(stream).lines();

        let value = read_response(&mut lines, "count", 5).await.unwrap().unwrap();
        assert_eq!(value, json!(7));
    }

    #[tokio::test]
    async fn test_read_response_reports_exited_driver() {
        let stream: &[u8] = b"{\"id\":1,\"ok\":true,\"result\":null}\n";
        let mut lines = BufReader::new(stream).lines();

        assert!(read_response(&mut lines, "url", 2).await.is_err());
    }
}
