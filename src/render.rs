//! Dashboard HTML generation and HTML to PNG rendering.
//!
//! Uses Chrome headless to render the dashboard to a PNG suitable for
//! e-ink panels, with optional ImageMagick post-processing to collapse
//! the image to a small grayscale palette.
//!
//! # Requirements
//!
//! - Google Chrome or Chromium must be installed
//! - ImageMagick (`convert` command) for grayscale reduction (optional)

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::DateTime;
use chrono_tz::Tz;
use tokio::process::Command;

use crate::error::Error;
use crate::event::EventEntry;
use crate::snapshot::UserSnapshot;
use crate::{DISPLAY_HEIGHT, DISPLAY_WIDTH};

/// Configuration for HTML rendering.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Path to Chrome executable (default: "google-chrome")
    pub chrome_path: String,

    /// Directory for temporary files (default: "/tmp/paperdash")
    pub temp_dir: PathBuf,

    /// Whether to reduce the image to a grayscale palette (default: true)
    pub optimize: bool,

    /// Number of colors for optimized images (default: 16)
    pub color_depth: u32,

    /// Display width (default: 960)
    pub width: u32,

    /// Display height (default: 540)
    pub height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            chrome_path: std::env::var("CHROME_PATH")
                .unwrap_or_else(|_| "google-chrome".to_string()),
            temp_dir: PathBuf::from("/tmp/paperdash"),
            optimize: true,
            color_depth: 16,
            width: DISPLAY_WIDTH,
            height: DISPLAY_HEIGHT,
        }
    }
}

impl RenderConfig {
    /// Create config with custom Chrome path.
    pub fn with_chrome_path(mut self, path: impl Into<String>) -> Self {
        self.chrome_path = path.into();
        self
    }

    /// Create config with custom temp directory.
    pub fn with_temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_dir = path.into();
        self
    }

    /// Disable grayscale reduction.
    pub fn without_optimization(mut self) -> Self {
        self.optimize = false;
        self
    }
}

static RENDER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Render HTML to PNG using Chrome headless.
///
/// Each call works in its own subdirectory of `temp_dir` so concurrent
/// renders do not clobber each other's files.
///
/// # Errors
///
/// Returns an error if Chrome is not found, fails to produce a
/// screenshot, or file I/O fails. ImageMagick failures fall back to the
/// unoptimized screenshot.
pub async fn render_html_to_png(html: &str, config: &RenderConfig) -> Result<Vec<u8>, Error> {
    let work_dir = config
        .temp_dir
        .join(format!("render-{}", RENDER_SEQ.fetch_add(1, Ordering::Relaxed)));
    tokio::fs::create_dir_all(&work_dir)
        .await
        .map_err(|e| Error::Io(format!("Failed to create temp dir: {}", e)))?;

    let result = render_in_dir(html, config, &work_dir).await;

    if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
        tracing::debug!("Failed to clean up render dir: {}", e);
    }

    result
}

async fn render_in_dir(
    html: &str,
    config: &RenderConfig,
    work_dir: &std::path::Path,
) -> Result<Vec<u8>, Error> {
    let html_path = work_dir.join("render.html");
    let screenshot_path = work_dir.join("screenshot.png");
    let optimized_path = work_dir.join("optimized.png");
    let chrome_data_dir = work_dir.join("chrome-data");

    tokio::fs::write(&html_path, html)
        .await
        .map_err(|e| Error::Io(format!("Failed to write HTML: {}", e)))?;

    tokio::fs::create_dir_all(&chrome_data_dir)
        .await
        .map_err(|e| Error::Io(format!("Failed to create chrome data dir: {}", e)))?;

    let html_url = format!("file://{}", html_path.display());

    let output = Command::new(&config.chrome_path)
        .arg("--headless=new")
        .arg("--no-sandbox")
        .arg("--disable-gpu")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-software-rasterizer")
        .arg("--no-first-run")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--force-device-scale-factor=1")
        .arg("--hide-scrollbars")
        .arg("--default-background-color=ffffffff")
        .arg(format!("--user-data-dir={}", chrome_data_dir.display()))
        .arg(format!(
            "--window-size={},{}",
            config.width,
            config.height + 100 // Extra height for scrollbar avoidance
        ))
        .arg(format!("--screenshot={}", screenshot_path.display()))
        .arg(&html_url)
        .output()
        .await
        .map_err(|e| Error::Render(format!("Failed to run Chrome: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::warn!("Chrome stderr: {}", stderr);
    }

    if !tokio::fs::try_exists(&screenshot_path)
        .await
        .unwrap_or(false)
    {
        return Err(Error::Render(
            "Chrome did not create screenshot".to_string(),
        ));
    }

    let final_path = if config.optimize {
        let convert_result = Command::new("convert")
            .arg(&screenshot_path)
            .arg("-crop")
            .arg(format!("{}x{}+0+0", config.width, config.height))
            .arg("+repage")
            .arg("-colorspace")
            .arg("Gray")
            .arg("-colors")
            .arg(config.color_depth.to_string())
            .arg("-depth")
            .arg("4")
            .arg(&optimized_path)
            .output()
            .await;

        match convert_result {
            Ok(output) if output.status.success() => {
                if tokio::fs::try_exists(&optimized_path)
                    .await
                    .unwrap_or(false)
                {
                    optimized_path
                } else {
                    screenshot_path
                }
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                tracing::warn!("ImageMagick optimization failed: {}", stderr);
                screenshot_path
            }
            Err(e) => {
                tracing::warn!("ImageMagick not available: {}", e);
                screenshot_path
            }
        }
    } else {
        screenshot_path
    };

    let png_data = tokio::fs::read(&final_path)
        .await
        .map_err(|e| Error::Io(format!("Failed to read screenshot: {}", e)))?;

    tracing::info!("Rendered PNG: {} bytes", png_data.len());

    Ok(png_data)
}

/// Build the full dashboard HTML for one user's snapshot.
///
/// The layout is a left status pane (clock, date, weather) and two event
/// columns for today and tomorrow. Timed events for today that are
/// already in the past render gray.
pub fn dashboard_html(snapshot: &UserSnapshot, now: DateTime<Tz>) -> String {
    let clock = now.format("%H:%M");
    let date = now.format("%a, %d %b");

    let (temp, high_low, humidity, conditions) = match &snapshot.weather {
        Some(w) => (
            fmt_temp(w.temp),
            format!("H {}  L {}", fmt_temp(w.high), fmt_temp(w.low)),
            w.humidity
                .map(|h| format!("RH {:.0}%", h))
                .unwrap_or_else(|| "RH --%".to_string()),
            wmo_label(w.weather_code),
        ),
        None => (
            "--°".to_string(),
            "H --°  L --°".to_string(),
            "RH --%".to_string(),
            "--",
        ),
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
  * {{ margin: 0; padding: 0; box-sizing: border-box; }}
  body {{
    width: {width}px; height: {height}px;
    background: #fff; color: #000;
    font-family: "Helvetica Neue", Arial, sans-serif;
    display: flex; overflow: hidden;
  }}
  .pane {{
    width: 300px; height: 100%;
    background: #000; color: #fff;
    padding: 28px 24px;
    display: flex; flex-direction: column;
  }}
  .clock {{ font-size: 72px; font-weight: 700; letter-spacing: -2px; }}
  .date {{ font-size: 26px; margin-top: 4px; }}
  .weather {{ margin-top: auto; }}
  .temp {{ font-size: 56px; font-weight: 700; }}
  .conditions {{ font-size: 24px; margin-top: 4px; }}
  .detail {{ font-size: 20px; margin-top: 8px; opacity: 0.85; }}
  .days {{ flex: 1; display: flex; }}
  .day {{ flex: 1; padding: 24px 20px; border-left: 2px solid #000; }}
  .day h2 {{
    font-size: 28px; text-transform: uppercase;
    border-bottom: 3px solid #000; padding-bottom: 8px; margin-bottom: 12px;
  }}
  .event {{ display: flex; font-size: 21px; padding: 6px 0; }}
  .event .time {{ width: 92px; flex-shrink: 0; font-weight: 700; }}
  .event .title {{ overflow: hidden; text-overflow: ellipsis; white-space: nowrap; }}
  .event.past {{ color: #888; }}
  .event.error .time {{ color: #fff; background: #000; text-align: center; }}
  .empty {{ font-size: 21px; color: #888; font-style: italic; padding: 6px 0; }}
</style>
</head>
<body>
  <div class="pane">
    <div class="clock">{clock}</div>
    <div class="date">{date}</div>
    <div class="weather">
      <div class="temp">{temp}</div>
      <div class="conditions">{conditions}</div>
      <div class="detail">{high_low}</div>
      <div class="detail">{humidity}</div>
    </div>
  </div>
  <div class="days">
    <div class="day">
      <h2>Today</h2>
{today}
    </div>
    <div class="day">
      <h2>Tomorrow</h2>
{tomorrow}
    </div>
  </div>
</body>
</html>
"#,
        width = DISPLAY_WIDTH,
        height = DISPLAY_HEIGHT,
        clock = clock,
        date = date,
        temp = temp,
        conditions = conditions,
        high_low = high_low,
        humidity = humidity,
        today = event_rows(&snapshot.today, Some(now)),
        tomorrow = event_rows(&snapshot.tomorrow, None),
    )
}

/// Rows for one day column. `now` enables the past-event graying used
/// for today; tomorrow passes `None`.
fn event_rows(entries: &[EventEntry], now: Option<DateTime<Tz>>) -> String {
    if entries.is_empty() {
        return "      <div class=\"empty\">No events</div>".to_string();
    }

    let mut rows = String::new();
    for entry in entries {
        let mut class = "event".to_string();
        if entry.time == "ERR" {
            class.push_str(" error");
        } else if entry.time != "All Day" && now.is_some_and(|n| entry.sort_key < n) {
            class.push_str(" past");
        }
        rows.push_str(&format!(
            "      <div class=\"{}\"><span class=\"time\">{}</span><span class=\"title\">{}</span></div>\n",
            class,
            escape_html(&entry.time),
            escape_html(&entry.title),
        ));
    }
    rows
}

fn fmt_temp(value: Option<f64>) -> String {
    match value {
        Some(t) => format!("{:.0}°", t),
        None => "--°".to_string(),
    }
}

/// Human label for a WMO weather interpretation code.
fn wmo_label(code: Option<i64>) -> &'static str {
    match code {
        Some(0) => "Clear",
        Some(1 | 2) => "Partly Cloudy",
        Some(3) => "Overcast",
        Some(45 | 48) => "Fog",
        Some(51..=57) => "Drizzle",
        Some(61..=67) => "Rain",
        Some(71..=77) => "Snow",
        Some(80..=82) => "Showers",
        Some(85 | 86) => "Snow Showers",
        Some(95..=99) => "Thunderstorm",
        _ => "--",
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
