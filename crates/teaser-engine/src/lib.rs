use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Local;
use image::{Rgb, RgbImage};
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use teaser_contracts::anonymize::{build_anonymize_prompt, rule_based_anonymize};
use teaser_contracts::config::EngineConfig;
use teaser_contracts::events::{EventKind, EventPayload, EventWriter};
use teaser_contracts::narratives::NarrativeRegistry;
use teaser_contracts::prompts::{prompts_for, sector_key, IMAGE_TYPES};
use teaser_contracts::research::{
    build_research_prompt, parse_research_response, ResearchSummary,
};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const PLACEHOLDER_WIDTH: u32 = 800;
const PLACEHOLDER_HEIGHT: u32 = 600;
const CHART_WIDTH: u32 = 1000;
const CHART_HEIGHT: u32 = 600;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([45, 35, 75]);

/// Brand palette, cycled by index across chart series.
const PALETTE: [Rgb<u8>; 5] = [
    Rgb([0x00, 0xBF, 0xB3]),
    Rgb([0xE8, 0x4D, 0x8A]),
    Rgb([0xFE, 0xB9, 0x5F]),
    Rgb([0x7B, 0x68, 0xEE]),
    Rgb([0x4E, 0xCD, 0xC4]),
];

/// Gradient color pairs for placeholder art, keyed by sector.
const SECTOR_GRADIENTS: &[(&str, [Rgb<u8>; 2])] = &[
    ("manufacturing", [Rgb([45, 35, 75]), Rgb([0, 191, 179])]),
    ("pharmaceuticals", [Rgb([45, 35, 75]), Rgb([126, 87, 194])]),
    ("technology", [Rgb([45, 35, 75]), Rgb([0, 150, 255])]),
    ("logistics", [Rgb([45, 35, 75]), Rgb([254, 185, 95])]),
    ("electronics", [Rgb([45, 35, 75]), Rgb([232, 77, 138])]),
    ("entertainment", [Rgb([45, 35, 75]), Rgb([255, 105, 135])]),
];

const INVESTMENT_TEMPLATE: &str = "\u{2022} Strong market position in a growing industry\n\
     \u{2022} Proven track record of operational excellence\n\
     \u{2022} Attractive financial profile with growth potential\n\
     \u{2022} Strategic value to potential acquirers";
const ANONYMIZE_TEMPLATE: &str =
    "The Company operates in its core sector with established market presence.";
const OVERVIEW_TEMPLATE: &str = "The Target is a well-established player in its industry segment \
     with diversified operations and strong client relationships.";
const UNAVAILABLE_TEMPLATE: &str = "Content generation unavailable - model not loaded.";

#[derive(Debug, Clone)]
pub struct TextRequest {
    pub prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub max_tokens: u32,
    pub num_gpu: u32,
}

/// One tier of the text fallback chain. The engine walks providers in
/// priority order and returns the first `Ok` value; any `Err` (transport
/// failure, non-200 status, or an unusable reply) moves to the next tier.
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;
    /// Whether this tier is skipped when the availability probe says the
    /// configured model server is down.
    fn requires_availability(&self) -> bool {
        false
    }
    fn try_generate(&self, request: &TextRequest) -> Result<String>;
}

/// Blocking client for the Ollama generation endpoint.
///
/// Serves two tiers of the chain: the configured endpoint/model (gated on
/// the probe) and the hardcoded local defaults used when the first tier
/// fails. The hardcoded tier rejects empty replies so the chain can still
/// bottom out at the template tier.
struct OllamaProvider {
    tier: &'static str,
    base_url: String,
    model: String,
    timeout: Duration,
    /// `None` passes the caller's sampling options through (primary tier);
    /// `Some` posts these fixed options regardless of the request
    /// (hardcoded fallback tier).
    fixed_options: Option<Value>,
    reject_empty: bool,
    gated_on_probe: bool,
    http: HttpClient,
}

impl OllamaProvider {
    fn configured(config: &EngineConfig) -> Self {
        Self {
            tier: "ollama-primary",
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            fixed_options: None,
            reject_empty: false,
            gated_on_probe: true,
            http: HttpClient::new(),
        }
    }

    fn local_default() -> Self {
        Self {
            tier: "ollama-default",
            base_url: "http://localhost:11434".to_string(),
            model: "janus:latest".to_string(),
            timeout: Duration::from_secs(120),
            fixed_options: Some(json!({
                "temperature": 0.7,
                "num_predict": 1024,
                "num_gpu": 99,
                "top_p": 0.9,
            })),
            reject_empty: true,
            gated_on_probe: false,
            http: HttpClient::new(),
        }
    }

    fn generate_endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

impl TextProvider for OllamaProvider {
    fn name(&self) -> &str {
        self.tier
    }

    fn requires_availability(&self) -> bool {
        self.gated_on_probe
    }

    fn try_generate(&self, request: &TextRequest) -> Result<String> {
        let endpoint = self.generate_endpoint();
        let options = match &self.fixed_options {
            Some(options) => options.clone(),
            None => json!({
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
                "num_gpu": request.num_gpu,
                "top_p": request.top_p,
                "repeat_penalty": request.repeat_penalty,
            }),
        };
        let payload = json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
            "options": options,
        });

        let response = self
            .http
            .post(&endpoint)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .with_context(|| format!("generation request failed ({endpoint})"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("generation endpoint returned status {}", status.as_u16());
        }
        let body: Value = response
            .json()
            .context("generation endpoint returned invalid JSON")?;
        let text = body
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        if self.reject_empty && text.is_empty() {
            bail!("generation endpoint returned an empty reply");
        }
        Ok(text)
    }
}

/// Final tier: static strings keyed off the original prompt. Infallible,
/// so `generate_text` always has something to return.
struct TemplateProvider;

impl TextProvider for TemplateProvider {
    fn name(&self) -> &str {
        "template"
    }

    fn try_generate(&self, request: &TextRequest) -> Result<String> {
        let prompt = request.prompt.to_lowercase();
        let text = if prompt.contains("investment") {
            INVESTMENT_TEMPLATE
        } else if prompt.contains("anonymize") {
            ANONYMIZE_TEMPLATE
        } else if prompt.contains("overview") {
            OVERVIEW_TEMPLATE
        } else {
            UNAVAILABLE_TEMPLATE
        };
        Ok(text.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    models: Option<Vec<CatalogModel>>,
}

#[derive(Debug, Deserialize)]
struct CatalogModel {
    name: String,
}

/// Generation façade over a locally hosted multimodal model server.
///
/// Every public operation returns a usable value under all failure
/// conditions: text degrades down the provider chain, sector images
/// degrade to procedural placeholders, charts degrade to `None`, analysis
/// degrades to a describing string. Construct one instance per logical
/// session; the availability probe result is cached for the instance's
/// lifetime.
pub struct TeaserEngine {
    config: EngineConfig,
    narratives: NarrativeRegistry,
    events: EventWriter,
    providers: Vec<Box<dyn TextProvider>>,
    availability: OnceLock<bool>,
    http: HttpClient,
}

impl TeaserEngine {
    pub fn new(config: EngineConfig, events: EventWriter) -> Result<Self> {
        fs::create_dir_all(&config.output_dir).with_context(|| {
            format!("failed to create {}", config.output_dir.display())
        })?;

        events.emit(
            EventKind::EngineInitialized,
            payload(json!({
                "endpoint": config.base_url,
                "model": config.model,
                "output_dir": config.output_dir.to_string_lossy().to_string(),
            })),
        )?;

        let providers: Vec<Box<dyn TextProvider>> = vec![
            Box::new(OllamaProvider::configured(&config)),
            Box::new(OllamaProvider::local_default()),
            Box::new(TemplateProvider),
        ];

        Ok(Self {
            config,
            narratives: NarrativeRegistry::default(),
            events,
            providers,
            availability: OnceLock::new(),
            http: HttpClient::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether the configured model is served by the catalog endpoint.
    ///
    /// The first call performs one short-timeout network round-trip; the
    /// result is cached for the lifetime of this instance. Callers needing
    /// a fresh probe construct a new engine.
    pub fn is_available(&self) -> bool {
        *self.availability.get_or_init(|| {
            let available = self.probe_catalog();
            let _ = self.events.emit(
                EventKind::ProbeCompleted,
                payload(json!({
                    "endpoint": self.config.base_url,
                    "model": self.config.model,
                    "available": available,
                })),
            );
            available
        })
    }

    fn probe_catalog(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        let response = match self.http.get(&url).timeout(PROBE_TIMEOUT).send() {
            Ok(response) => response,
            Err(_) => return false,
        };
        if !response.status().is_success() {
            return false;
        }
        let catalog: CatalogResponse = match response.json() {
            Ok(catalog) => catalog,
            Err(_) => return false,
        };
        let stem = self.config.model_stem().to_lowercase();
        catalog
            .models
            .unwrap_or_default()
            .iter()
            .any(|model| model.name.to_lowercase().contains(&stem))
    }

    /// Total text generation: walks the provider chain and returns the
    /// first usable reply. Never fails; the template tier always answers.
    pub fn generate_text(
        &self,
        prompt: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> String {
        let request = TextRequest {
            prompt: prompt.to_string(),
            temperature: temperature.unwrap_or(self.config.temperature),
            top_p: self.config.top_p,
            repeat_penalty: self.config.repeat_penalty,
            max_tokens: max_tokens.unwrap_or(self.config.max_new_tokens),
            num_gpu: self.config.num_gpu,
        };
        self.run_chain(&request)
    }

    fn run_chain(&self, request: &TextRequest) -> String {
        for provider in &self.providers {
            if provider.requires_availability() && !self.is_available() {
                let _ = self.events.emit(
                    EventKind::FallbackUsed,
                    payload(json!({
                        "tier": provider.name(),
                        "reason": "model unavailable",
                    })),
                );
                continue;
            }
            match provider.try_generate(request) {
                Ok(text) => {
                    let _ = self.events.emit(
                        EventKind::TextGenerated,
                        payload(json!({
                            "tier": provider.name(),
                            "chars": text.chars().count(),
                        })),
                    );
                    return text;
                }
                Err(err) => {
                    let _ = self.events.emit(
                        EventKind::FallbackUsed,
                        payload(json!({
                            "tier": provider.name(),
                            "reason": format!("{err:#}"),
                        })),
                    );
                }
            }
        }
        // The template tier never errors; an empty chain is a construction
        // bug, not a runtime condition.
        String::new()
    }

    /// Investment narrative of the given kind; unknown kinds render the
    /// business overview template.
    pub fn generate_narrative(&self, context: &str, sector: &str, kind: &str) -> String {
        let prompt = self.narratives.prompt_for(kind, sector, context);
        self.generate_text(&prompt, Some(0.4), Some(512))
    }

    /// Anonymize company-specific text for a blind teaser. If the model
    /// reply is empty or implausibly short, degrade to the deterministic
    /// rule-based substitution.
    pub fn anonymize_text(&self, text: &str, company_name: &str, sector: &str) -> String {
        let prompt = build_anonymize_prompt(text, company_name, sector);
        let max_tokens = (text.len() + 200).min(u32::MAX as usize) as u32;
        let result = self.generate_text(&prompt, Some(0.3), Some(max_tokens));
        if result.trim().len() < 10 {
            let _ = self.events.emit(
                EventKind::FallbackUsed,
                payload(json!({
                    "tier": "rule-based-anonymize",
                    "reason": "model reply too short",
                })),
            );
            return rule_based_anonymize(text, company_name);
        }
        result
    }

    /// Extract structured business intelligence from scraped web content.
    /// Parsing is total; the worst case is the all-defaults record.
    pub fn synthesize_research(
        &self,
        web_content: &str,
        query: &str,
        max_length: Option<u32>,
    ) -> ResearchSummary {
        let prompt = build_research_prompt(web_content, query);
        let response = self.generate_text(&prompt, Some(0.2), Some(max_length.unwrap_or(500)));
        parse_research_response(&response)
    }

    /// Sector-relevant slide image. Degrades to the procedural placeholder
    /// when the model is unavailable or synthesis fails; only a disk-write
    /// failure of the placeholder itself surfaces as an error.
    pub fn generate_sector_image(
        &self,
        sector: &str,
        image_type: &str,
        seed: Option<u64>,
    ) -> Result<PathBuf> {
        if !self.is_available() {
            return self.placeholder_image(sector, image_type);
        }
        let prompt = pick_prompt(prompts_for(sector, image_type), seed.unwrap_or_default());
        match self.model_backed_image(sector, image_type, prompt) {
            Ok(path) => {
                let _ = self.events.emit(
                    EventKind::ArtifactCreated,
                    payload(json!({
                        "path": path.to_string_lossy().to_string(),
                        "placeholder": false,
                    })),
                );
                Ok(path)
            }
            Err(err) => {
                let _ = self.events.emit(
                    EventKind::FallbackUsed,
                    payload(json!({
                        "tier": "placeholder-image",
                        "reason": format!("{err:#}"),
                    })),
                );
                self.placeholder_image(sector, image_type)
            }
        }
    }

    /// Batch helper: one image per type in `product`, `facility`,
    /// `abstract` order, up to `count`. Per-image failures are skipped.
    pub fn generate_sector_images(&self, sector: &str, count: usize) -> Vec<PathBuf> {
        IMAGE_TYPES
            .iter()
            .take(count)
            .filter_map(|image_type| self.generate_sector_image(sector, image_type, None).ok())
            .collect()
    }

    fn model_backed_image(
        &self,
        sector: &str,
        image_type: &str,
        prompt: &str,
    ) -> Result<PathBuf> {
        let endpoint = format!("{}/api/generate", self.config.base_url);
        let response = self
            .http
            .post(&endpoint)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&json!({
                "model": self.config.model,
                "prompt": format!("Generate an image: {prompt}"),
                "stream": false,
            }))
            .send()
            .with_context(|| format!("image request failed ({endpoint})"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("image endpoint returned status {}", status.as_u16());
        }
        let body: Value = response
            .json()
            .context("image endpoint returned invalid JSON")?;
        let encoded = body
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        if encoded.is_empty() {
            bail!("image endpoint returned no payload");
        }
        let bytes = BASE64
            .decode(encoded.as_bytes())
            .context("image payload is not valid base64")?;
        let decoded =
            image::load_from_memory(&bytes).context("image payload is not a decodable image")?;

        let filename = format!("{}_{}_{}.png", sector_key(sector), image_type, timestamp());
        let path = self.config.output_dir.join(filename);
        decoded
            .save(&path)
            .with_context(|| format!("failed to save {}", path.display()))?;
        Ok(path)
    }

    fn placeholder_image(&self, sector: &str, image_type: &str) -> Result<PathBuf> {
        let key = sector_key(sector);
        let [start, end] = SECTOR_GRADIENTS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, pair)| *pair)
            .unwrap_or(SECTOR_GRADIENTS[0].1);

        let mut canvas = RgbImage::new(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT);
        for y in 0..PLACEHOLDER_HEIGHT {
            let color = lerp_color(start, end, y as i32, PLACEHOLDER_HEIGHT as i32);
            for x in 0..PLACEHOLDER_WIDTH {
                canvas.put_pixel(x, y, color);
            }
        }

        let center_x = PLACEHOLDER_WIDTH as i32 / 2;
        let center_y = PLACEHOLDER_HEIGHT as i32 / 2;
        draw_text_centered(&mut canvas, &sector.to_uppercase(), center_x, center_y - 30, 8, WHITE);
        draw_text_centered(
            &mut canvas,
            &format!("[ {} ]", image_type.to_uppercase()),
            center_x,
            center_y + 30,
            4,
            Rgb([200, 200, 200]),
        );

        let filename = format!("{}_{}_{}.png", key, image_type, timestamp());
        let path = self.config.output_dir.join(filename);
        canvas
            .save(&path)
            .with_context(|| format!("failed to save {}", path.display()))?;

        let _ = self.events.emit(
            EventKind::ArtifactCreated,
            payload(json!({
                "path": path.to_string_lossy().to_string(),
                "placeholder": true,
            })),
        );
        Ok(path)
    }

    /// Describe an image through the model. Degrades to sentinel strings;
    /// never errors out.
    pub fn analyze_image(&self, path: &Path) -> String {
        if !self.is_available() {
            return "Image analysis not available - model not loaded".to_string();
        }
        match self.describe_image(path) {
            Ok(text) => text,
            Err(err) => {
                let _ = self.events.emit(
                    EventKind::AnalysisFailed,
                    payload(json!({
                        "path": path.to_string_lossy().to_string(),
                        "reason": format!("{err:#}"),
                    })),
                );
                format!("Analysis failed: {err:#}")
            }
        }
    }

    fn describe_image(&self, path: &Path) -> Result<String> {
        let bytes =
            fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let endpoint = format!("{}/api/generate", self.config.base_url);
        let response = self
            .http
            .post(&endpoint)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&json!({
                "model": self.config.model,
                "prompt": "Describe this image in detail, focusing on business-relevant elements.",
                "stream": false,
                "images": [BASE64.encode(&bytes)],
                "options": { "temperature": 0.3 },
            }))
            .send()
            .with_context(|| format!("analysis request failed ({endpoint})"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("analysis endpoint returned status {}", status.as_u16());
        }
        let body: Value = response
            .json()
            .context("analysis endpoint returned invalid JSON")?;
        Ok(body
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    /// Chart image for slide data. `bar`, `pie`, and `line` render their
    /// shape-specific keys with literal defaults; an unknown kind saves a
    /// blank titled canvas. Any render or save failure yields `None`.
    pub fn generate_chart_image(
        &self,
        chart_type: &str,
        data: &Map<String, Value>,
        title: &str,
    ) -> Option<PathBuf> {
        match self.render_chart(chart_type, data, title) {
            Ok(path) => {
                let _ = self.events.emit(
                    EventKind::ChartCreated,
                    payload(json!({
                        "chart_type": chart_type,
                        "path": path.to_string_lossy().to_string(),
                    })),
                );
                Some(path)
            }
            Err(err) => {
                let _ = self.events.emit(
                    EventKind::FallbackUsed,
                    payload(json!({
                        "tier": "chart",
                        "reason": format!("{err:#}"),
                    })),
                );
                None
            }
        }
    }

    fn render_chart(
        &self,
        chart_type: &str,
        data: &Map<String, Value>,
        title: &str,
    ) -> Result<PathBuf> {
        let mut canvas = RgbImage::from_pixel(CHART_WIDTH, CHART_HEIGHT, WHITE);

        match chart_type {
            "bar" => draw_bar_chart(&mut canvas, data),
            "pie" => draw_pie_chart(&mut canvas, data),
            "line" => draw_line_chart(&mut canvas, data),
            // Unsupported kinds keep the canvas blank; the file is still
            // written, matching the empty-figure behavior of the charting
            // path this replaces.
            _ => {}
        }

        if !title.is_empty() {
            draw_text_centered(&mut canvas, &title.to_uppercase(), CHART_WIDTH as i32 / 2, 40, 3, INK);
        }

        let filename = format!("chart_{}_{}.png", chart_type, timestamp());
        let path = self.config.output_dir.join(filename);
        canvas
            .save(&path)
            .with_context(|| format!("failed to save {}", path.display()))?;
        Ok(path)
    }
}

fn payload(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_default()
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Deterministic variant selection: same prompt list and seed always pick
/// the same entry.
fn pick_prompt(prompts: &'static [&'static str], seed: u64) -> &'static str {
    if prompts.is_empty() {
        return "Professional business image";
    }
    let mut hasher = Sha256::new();
    for prompt in prompts {
        hasher.update(prompt.as_bytes());
    }
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    prompts[digest[0] as usize % prompts.len()]
}

fn lerp_color(start: Rgb<u8>, end: Rgb<u8>, step: i32, steps: i32) -> Rgb<u8> {
    let channel = |a: u8, b: u8| -> u8 {
        let value = a as i32 + (b as i32 - a as i32) * step / steps.max(1);
        value.clamp(0, 255) as u8
    };
    Rgb([
        channel(start[0], end[0]),
        channel(start[1], end[1]),
        channel(start[2], end[2]),
    ])
}

fn blend_toward_white(color: Rgb<u8>, alpha: f32) -> Rgb<u8> {
    let channel = |c: u8| -> u8 {
        let value = c as f32 * alpha + 255.0 * (1.0 - alpha);
        value.round().clamp(0.0, 255.0) as u8
    };
    Rgb([channel(color[0]), channel(color[1]), channel(color[2])])
}

fn string_list(data: &Map<String, Value>, key: &str, defaults: &[&str]) -> Vec<String> {
    let values: Vec<String> = data
        .get(key)
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| match row {
                    Value::String(text) => Some(text.clone()),
                    Value::Number(number) => Some(number.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    if values.is_empty() {
        defaults.iter().map(|value| value.to_string()).collect()
    } else {
        values
    }
}

fn number_list(data: &Map<String, Value>, key: &str, defaults: &[f64]) -> Vec<f64> {
    let values: Vec<f64> = data
        .get(key)
        .and_then(Value::as_array)
        .map(|rows| rows.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();
    if values.is_empty() {
        defaults.to_vec()
    } else {
        values
    }
}

fn draw_bar_chart(canvas: &mut RgbImage, data: &Map<String, Value>) {
    let categories = string_list(data, "categories", &["A", "B", "C"]);
    let values = number_list(data, "values", &[10.0, 20.0, 30.0]);
    let count = categories.len().min(values.len());
    if count == 0 {
        return;
    }

    let left = 80;
    let right = CHART_WIDTH as i32 - 40;
    let top = 90;
    let bottom = CHART_HEIGHT as i32 - 80;
    let plot_width = right - left;
    let plot_height = bottom - top;

    let max_value = values
        .iter()
        .take(count)
        .cloned()
        .fold(f64::MIN, f64::max)
        .max(f64::EPSILON);

    let slot = plot_width / count as i32;
    let bar_width = slot * 6 / 10;
    for index in 0..count {
        let value = values[index].max(0.0);
        let bar_height = ((value / max_value) * plot_height as f64).round() as i32;
        let x = left + index as i32 * slot + slot * 2 / 10;
        fill_rect(
            canvas,
            x,
            bottom - bar_height,
            bar_width,
            bar_height,
            PALETTE[index % PALETTE.len()],
        );
        draw_text_centered(
            canvas,
            &categories[index].to_uppercase(),
            x + bar_width / 2,
            bottom + 20,
            2,
            INK,
        );
    }

    // baseline axis
    fill_rect(canvas, left, bottom, plot_width, 2, INK);

    if let Some(ylabel) = data.get("ylabel").and_then(Value::as_str) {
        draw_text_centered(canvas, &ylabel.to_uppercase(), left + 60, top - 20, 2, INK);
    }
}

fn draw_pie_chart(canvas: &mut RgbImage, data: &Map<String, Value>) {
    let labels = string_list(data, "labels", &["A", "B", "C"]);
    let values = number_list(data, "values", &[30.0, 40.0, 30.0]);
    let count = labels.len().min(values.len());
    if count == 0 {
        return;
    }

    let total: f64 = values.iter().take(count).map(|value| value.max(0.0)).sum();
    if total <= 0.0 {
        return;
    }
    let fractions: Vec<f64> = values
        .iter()
        .take(count)
        .map(|value| value.max(0.0) / total)
        .collect();

    let center_x = 360i32;
    let center_y = 320i32;
    let radius = 200i32;
    let radius_sq = (radius * radius) as f32;

    // Cumulative slice boundaries in turns, starting at twelve o'clock.
    let mut boundaries = Vec::with_capacity(count + 1);
    let mut acc = 0.0f64;
    boundaries.push(0.0f32);
    for fraction in &fractions {
        acc += fraction;
        boundaries.push(acc as f32);
    }

    for y in (center_y - radius)..=(center_y + radius) {
        for x in (center_x - radius)..=(center_x + radius) {
            let dx = (x - center_x) as f32;
            let dy = (y - center_y) as f32;
            if dx * dx + dy * dy > radius_sq {
                continue;
            }
            // Angle measured clockwise from the top, as a fraction of a turn.
            let mut turn = dx.atan2(-dy) / (2.0 * std::f32::consts::PI);
            if turn < 0.0 {
                turn += 1.0;
            }
            let slice = boundaries
                .windows(2)
                .position(|pair| turn >= pair[0] && turn < pair[1])
                .unwrap_or(count - 1);
            put_pixel_clamped(canvas, x, y, PALETTE[slice % PALETTE.len()]);
        }
    }

    let legend_x = 620i32;
    let mut legend_y = center_y - (count as i32 * 40) / 2;
    for index in 0..count {
        fill_rect(canvas, legend_x, legend_y, 20, 20, PALETTE[index % PALETTE.len()]);
        let percent = (fractions[index] * 100.0).round() as i64;
        let caption = format!("{} {}%", labels[index].to_uppercase(), percent);
        draw_text_left(canvas, &caption, legend_x + 32, legend_y + 4, 2, INK);
        legend_y += 40;
    }
}

fn draw_line_chart(canvas: &mut RgbImage, data: &Map<String, Value>) {
    let y_values = number_list(data, "y", &[10.0, 15.0, 13.0, 18.0, 22.0]);
    if y_values.is_empty() {
        return;
    }
    let x_values = {
        let provided = number_list(data, "x", &[]);
        if provided.len() == y_values.len() {
            provided
        } else {
            (0..y_values.len()).map(|index| index as f64).collect()
        }
    };

    let left = 80;
    let right = CHART_WIDTH as i32 - 40;
    let top = 90;
    let bottom = CHART_HEIGHT as i32 - 80;

    let x_min = x_values.iter().cloned().fold(f64::MAX, f64::min);
    let x_max = x_values.iter().cloned().fold(f64::MIN, f64::max);
    let y_min = y_values.iter().cloned().fold(f64::MAX, f64::min).min(0.0);
    let y_max = y_values.iter().cloned().fold(f64::MIN, f64::max);
    let x_span = (x_max - x_min).max(f64::EPSILON);
    let y_span = (y_max - y_min).max(f64::EPSILON);

    let project = |x: f64, y: f64| -> (i32, i32) {
        let px = left + (((x - x_min) / x_span) * (right - left) as f64).round() as i32;
        let py = bottom - (((y - y_min) / y_span) * (bottom - top) as f64).round() as i32;
        (px, py)
    };

    let points: Vec<(i32, i32)> = x_values
        .iter()
        .zip(y_values.iter())
        .map(|(&x, &y)| project(x, y))
        .collect();

    // light fill under the curve
    let fill = blend_toward_white(PALETTE[0], 0.3);
    for pair in points.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if x1 <= x0 {
            continue;
        }
        for x in x0..=x1 {
            let y = y0 + (y1 - y0) * (x - x0) / (x1 - x0).max(1);
            for row in y..=bottom {
                put_pixel_clamped(canvas, x, row, fill);
            }
        }
    }

    for pair in points.windows(2) {
        draw_segment(canvas, pair[0].0, pair[0].1, pair[1].0, pair[1].1, 3, PALETTE[0]);
    }
    for &(x, y) in &points {
        fill_rect(canvas, x - 3, y - 3, 7, 7, PALETTE[0]);
    }

    fill_rect(canvas, left, bottom, right - left, 2, INK);

    if let Some(xlabel) = data.get("xlabel").and_then(Value::as_str) {
        draw_text_centered(
            canvas,
            &xlabel.to_uppercase(),
            (left + right) / 2,
            bottom + 40,
            2,
            INK,
        );
    }
    if let Some(ylabel) = data.get("ylabel").and_then(Value::as_str) {
        draw_text_centered(canvas, &ylabel.to_uppercase(), left + 60, top - 20, 2, INK);
    }
}

fn put_pixel_clamped(canvas: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x < 0 || y < 0 || x >= canvas.width() as i32 || y >= canvas.height() as i32 {
        return;
    }
    canvas.put_pixel(x as u32, y as u32, color);
}

fn fill_rect(canvas: &mut RgbImage, x: i32, y: i32, width: i32, height: i32, color: Rgb<u8>) {
    for row in y..y + height {
        for col in x..x + width {
            put_pixel_clamped(canvas, col, row, color);
        }
    }
}

fn draw_segment(
    canvas: &mut RgbImage,
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    thickness: i32,
    color: Rgb<u8>,
) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let step_x = if x0 < x1 { 1 } else { -1 };
    let step_y = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let mut x = x0;
    let mut y = y0;
    let pad = thickness / 2;
    loop {
        fill_rect(canvas, x - pad, y - pad, thickness, thickness, color);
        if x == x1 && y == y1 {
            break;
        }
        let doubled = 2 * err;
        if doubled >= dy {
            err += dy;
            x += step_x;
        }
        if doubled <= dx {
            err += dx;
            y += step_y;
        }
    }
}

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
// one column of spacing at native scale
const GLYPH_ADVANCE: i32 = GLYPH_WIDTH + 1;

fn draw_text_centered(
    canvas: &mut RgbImage,
    text: &str,
    center_x: i32,
    center_y: i32,
    scale: i32,
    color: Rgb<u8>,
) {
    let count = text.chars().count() as i32;
    if count == 0 {
        return;
    }
    let width = count * GLYPH_ADVANCE * scale - scale;
    draw_text_left(
        canvas,
        text,
        center_x - width / 2,
        center_y - GLYPH_HEIGHT * scale / 2,
        scale,
        color,
    );
}

fn draw_text_left(
    canvas: &mut RgbImage,
    text: &str,
    origin_x: i32,
    origin_y: i32,
    scale: i32,
    color: Rgb<u8>,
) {
    let mut pen_x = origin_x;
    for ch in text.chars() {
        let rows = glyph_rows(ch);
        for (row_index, row) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if row & (1 << (GLYPH_WIDTH - 1 - col)) != 0 {
                    fill_rect(
                        canvas,
                        pen_x + col * scale,
                        origin_y + row_index as i32 * scale,
                        scale,
                        scale,
                        color,
                    );
                }
            }
        }
        pen_x += GLYPH_ADVANCE * scale;
    }
}

/// 5x7 bitmap glyphs, uppercase-only. Enough for sector names, chart
/// labels, and bracketed type captions; anything unmapped renders as a
/// hollow box.
fn glyph_rows(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ' ' => [0, 0, 0, 0, 0, 0, 0],
        '[' => [0b01110, 0b01000, 0b01000, 0b01000, 0b01000, 0b01000, 0b01110],
        ']' => [0b01110, 0b00010, 0b00010, 0b00010, 0b00010, 0b00010, 0b01110],
        '%' => [0b11000, 0b11001, 0b00010, 0b00100, 0b01000, 0b10011, 0b00011],
        '.' => [0, 0, 0, 0, 0, 0b01100, 0b01100],
        ',' => [0, 0, 0, 0, 0b01100, 0b00100, 0b01000],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        '/' => [0b00001, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b10000],
        '&' => [0b01100, 0b10010, 0b10100, 0b01000, 0b10101, 0b10010, 0b01101],
        _ => [0b11111, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11111],
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    use serde_json::{json, Map, Value};
    use teaser_contracts::config::EngineConfig;
    use teaser_contracts::events::EventWriter;

    use super::{
        pick_prompt, HttpClient, OllamaProvider, TeaserEngine, TemplateProvider, TextProvider,
        TextRequest, ANONYMIZE_TEMPLATE, INVESTMENT_TEMPLATE, OVERVIEW_TEMPLATE,
        UNAVAILABLE_TEMPLATE,
    };

    fn offline_engine(dir: &std::path::Path) -> anyhow::Result<TeaserEngine> {
        // Nothing listens on port 9; the probe fails fast and caches false.
        let mut config = EngineConfig::default();
        config.base_url = "http://127.0.0.1:9".to_string();
        config.output_dir = dir.join("generated_images");
        let events = EventWriter::new(dir.join("events.jsonl"), "test-session");
        TeaserEngine::new(config, events)
    }

    /// Engine whose chain is only the infallible template tier, so tests
    /// never touch the network.
    fn template_only_engine(dir: &std::path::Path) -> anyhow::Result<TeaserEngine> {
        let mut engine = offline_engine(dir)?;
        engine.providers = vec![Box::new(TemplateProvider)];
        Ok(engine)
    }

    struct ScriptedProvider {
        name: &'static str,
        reply: anyhow::Result<String>,
        calls: Arc<AtomicUsize>,
    }

    impl TextProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn try_generate(&self, _request: &TextRequest) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(err) => Err(anyhow::anyhow!("{err:#}")),
            }
        }
    }

    struct RecordingProvider {
        seen: Arc<Mutex<Vec<TextRequest>>>,
    }

    impl TextProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        fn try_generate(&self, request: &TextRequest) -> anyhow::Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            Ok("recorded".to_string())
        }
    }

    /// One-shot canned HTTP server. Answers up to `max_requests` requests
    /// with the given JSON body, counting connections.
    fn spawn_canned_server(
        body: &'static str,
        max_requests: usize,
    ) -> anyhow::Result<(String, Arc<AtomicUsize>)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        thread::spawn(move || {
            for _ in 0..max_requests {
                let Ok((mut stream, _)) = listener.accept() else {
                    break;
                };
                hits_clone.fetch_add(1, Ordering::SeqCst);
                let mut buffer = [0u8; 4096];
                let _ = stream.read(&mut buffer);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        Ok((format!("http://{addr}"), hits))
    }

    #[test]
    fn probe_true_when_catalog_lists_model_and_result_is_cached() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (base_url, hits) = spawn_canned_server(
            r#"{"models":[{"name":"janus:latest"},{"name":"llama3:8b"}]}"#,
            4,
        )?;
        let mut config = EngineConfig::default();
        config.base_url = base_url;
        config.output_dir = temp.path().join("generated_images");
        let events = EventWriter::new(temp.path().join("events.jsonl"), "probe-test");
        let engine = TeaserEngine::new(config, events)?;

        assert!(engine.is_available());
        assert!(engine.is_available());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn probe_false_when_catalog_lacks_model() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (base_url, _hits) =
            spawn_canned_server(r#"{"models":[{"name":"llama3:8b"}]}"#, 4)?;
        let mut config = EngineConfig::default();
        config.base_url = base_url;
        config.output_dir = temp.path().join("generated_images");
        let events = EventWriter::new(temp.path().join("events.jsonl"), "probe-test");
        let engine = TeaserEngine::new(config, events)?;

        assert!(!engine.is_available());
        Ok(())
    }

    #[test]
    fn probe_match_is_case_insensitive_substring() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (base_url, _hits) =
            spawn_canned_server(r#"{"models":[{"name":"JANUS-pro:7b"}]}"#, 4)?;
        let mut config = EngineConfig::default();
        config.base_url = base_url;
        config.output_dir = temp.path().join("generated_images");
        let events = EventWriter::new(temp.path().join("events.jsonl"), "probe-test");
        let engine = TeaserEngine::new(config, events)?;

        assert!(engine.is_available());
        Ok(())
    }

    #[test]
    fn probe_unreachable_server_is_unavailable() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = offline_engine(temp.path())?;
        assert!(!engine.is_available());
        Ok(())
    }

    #[test]
    fn chain_returns_first_success_and_stops() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut engine = offline_engine(temp.path())?;
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));
        engine.providers = vec![
            Box::new(ScriptedProvider {
                name: "winner",
                reply: Ok("primary reply".to_string()),
                calls: Arc::clone(&first_calls),
            }),
            Box::new(ScriptedProvider {
                name: "unreached",
                reply: Ok("never".to_string()),
                calls: Arc::clone(&second_calls),
            }),
        ];

        assert_eq!(engine.generate_text("anything", None, None), "primary reply");
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn chain_falls_through_errors_to_next_tier() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut engine = offline_engine(temp.path())?;
        let calls = Arc::new(AtomicUsize::new(0));
        engine.providers = vec![
            Box::new(ScriptedProvider {
                name: "broken",
                reply: Err(anyhow::anyhow!("connection refused")),
                calls: Arc::clone(&calls),
            }),
            Box::new(TemplateProvider),
        ];

        let text = engine.generate_text("tell me about the investment case", None, None);
        assert_eq!(text, INVESTMENT_TEMPLATE);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn empty_reply_at_reject_empty_tier_falls_through() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        // 200 with a whitespace-only `response`; a tier that rejects empty
        // replies must error so the template tier still answers.
        let (base_url, hits) = spawn_canned_server(r#"{"response":"   "}"#, 4)?;
        let mut engine = offline_engine(temp.path())?;
        engine.providers = vec![
            Box::new(OllamaProvider {
                tier: "canned",
                base_url,
                model: "janus:latest".to_string(),
                timeout: std::time::Duration::from_secs(5),
                fixed_options: Some(json!({ "temperature": 0.7 })),
                reject_empty: true,
                gated_on_probe: false,
                http: HttpClient::new(),
            }),
            Box::new(TemplateProvider),
        ];

        let text = engine.generate_text("state the investment case", None, None);
        assert_eq!(text, INVESTMENT_TEMPLATE);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn generate_text_always_returns_a_string_offline() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = template_only_engine(temp.path())?;

        assert_eq!(
            engine.generate_text("investment thesis please", None, None),
            INVESTMENT_TEMPLATE
        );
        assert_eq!(
            engine.generate_text("please anonymize this", None, None),
            ANONYMIZE_TEMPLATE
        );
        assert_eq!(
            engine.generate_text("write an overview", None, None),
            OVERVIEW_TEMPLATE
        );
        assert_eq!(
            engine.generate_text("unrelated request", None, None),
            UNAVAILABLE_TEMPLATE
        );
        Ok(())
    }

    #[test]
    fn generate_text_applies_config_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut engine = offline_engine(temp.path())?;
        let seen = Arc::new(Mutex::new(Vec::new()));
        engine.providers = vec![Box::new(RecordingProvider {
            seen: Arc::clone(&seen),
        })];

        engine.generate_text("prompt", None, None);
        engine.generate_text("prompt", Some(0.2), Some(64));

        let requests = seen.lock().unwrap();
        assert_eq!(requests[0].temperature, 0.7);
        assert_eq!(requests[0].max_tokens, 1024);
        assert_eq!(requests[0].top_p, 0.9);
        assert_eq!(requests[0].num_gpu, 99);
        assert_eq!(requests[1].temperature, 0.2);
        assert_eq!(requests[1].max_tokens, 64);
        Ok(())
    }

    #[test]
    fn narrative_uses_registry_and_degrades_offline() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = template_only_engine(temp.path())?;

        // the overview prompt contains "overview", so the template tier
        // answers with the overview boilerplate
        let text = engine.generate_narrative("ctx", "Technology", "business_overview");
        assert_eq!(text, OVERVIEW_TEMPLATE);

        let highlights = engine.generate_narrative("ctx", "Technology", "investment_highlights");
        assert_eq!(highlights, INVESTMENT_TEMPLATE);
        Ok(())
    }

    #[test]
    fn anonymize_offline_returns_usable_text() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = template_only_engine(temp.path())?;
        // The rewrite prompt names the anonymization task, so the template
        // tier answers with the anonymized boilerplate; it is long enough
        // that the rule-based backstop is not consulted.
        let text = engine.anonymize_text("Acme grew 30% this year.", "Acme", "Manufacturing");
        assert_eq!(text, ANONYMIZE_TEMPLATE);
        Ok(())
    }

    #[test]
    fn short_model_reply_triggers_rule_based_anonymization() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut engine = offline_engine(temp.path())?;
        engine.providers = vec![Box::new(ScriptedProvider {
            name: "terse",
            reply: Ok("ok".to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        })];

        let text = engine.anonymize_text(
            "Acme Widgets grew 30% under its founder.",
            "Acme Widgets",
            "Manufacturing",
        );
        assert!(!text.to_lowercase().contains("acme widgets"));
        assert!(text.contains("The Company"));
        assert!(text.contains("30%"));
        Ok(())
    }

    #[test]
    fn research_offline_yields_default_record() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = template_only_engine(temp.path())?;
        let summary = engine.synthesize_research("scraped content", "widget market", None);
        assert_eq!(summary.market_size, None);
        assert!(summary.key_trends.is_empty());
        Ok(())
    }

    #[test]
    fn research_parses_scripted_model_reply() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut engine = offline_engine(temp.path())?;
        engine.providers = vec![Box::new(ScriptedProvider {
            name: "scripted",
            reply: Ok("MARKET_SIZE: N/A\nCAGR: 12.5%\nKEY_TRENDS: a; b".to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        })];

        let summary = engine.synthesize_research("content", "query", Some(300));
        assert_eq!(summary.market_size, None);
        assert_eq!(summary.cagr.as_deref(), Some("12.5%"));
        assert_eq!(summary.key_trends, vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn placeholder_image_name_and_contents() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = offline_engine(temp.path())?;

        let path = engine.generate_sector_image("Technology", "product", None)?;
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or_default();
        assert!(name.starts_with("technology_product_"));
        assert!(name.ends_with(".png"));

        let rendered = image::open(&path)?.to_rgb8();
        assert_eq!(rendered.width(), 800);
        assert_eq!(rendered.height(), 600);
        // top scanline is the start of the gradient pair
        assert_eq!(*rendered.get_pixel(0, 0), image::Rgb([45, 35, 75]));
        Ok(())
    }

    #[test]
    fn placeholder_uses_first_sector_word_and_default_colors() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = offline_engine(temp.path())?;

        let path = engine.generate_sector_image("Agritech Services", "abstract", None)?;
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or_default();
        assert!(name.starts_with("agritech_abstract_"));
        Ok(())
    }

    #[test]
    fn batch_generates_one_image_per_type() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = offline_engine(temp.path())?;

        let paths = engine.generate_sector_images("Pharmaceuticals", 3);
        assert_eq!(paths.len(), 3);
        let names: Vec<String> = paths
            .iter()
            .filter_map(|path| path.file_name())
            .filter_map(|name| name.to_str())
            .map(str::to_string)
            .collect();
        assert!(names[0].starts_with("pharmaceuticals_product_"));
        assert!(names[1].starts_with("pharmaceuticals_facility_"));
        assert!(names[2].starts_with("pharmaceuticals_abstract_"));
        Ok(())
    }

    #[test]
    fn analyze_image_offline_returns_sentinel() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = offline_engine(temp.path())?;
        let text = engine.analyze_image(std::path::Path::new("missing.png"));
        assert_eq!(text, "Image analysis not available - model not loaded");
        Ok(())
    }

    #[test]
    fn pie_chart_renders_and_returns_path() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = offline_engine(temp.path())?;

        let data = obj(json!({"labels": ["X", "Y"], "values": [60, 40]}));
        let path = engine.generate_chart_image("pie", &data, "Revenue Mix");
        let path = path.expect("pie chart should render");
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or_default();
        assert!(name.starts_with("chart_pie_"));
        assert!(image::open(&path).is_ok());
        Ok(())
    }

    #[test]
    fn bar_chart_uses_defaults_when_keys_absent() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = offline_engine(temp.path())?;

        let path = engine.generate_chart_image("bar", &Map::new(), "");
        assert!(path.is_some());
        Ok(())
    }

    #[test]
    fn line_chart_renders_supplied_series() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = offline_engine(temp.path())?;

        let data = obj(json!({"x": [1, 2, 3, 4], "y": [120, 145, 180, 220]}));
        let path = engine.generate_chart_image("line", &data, "Revenue Growth");
        assert!(path.is_some());
        Ok(())
    }

    #[test]
    fn unsupported_chart_type_does_not_fail() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = offline_engine(temp.path())?;

        let path = engine.generate_chart_image("radar", &Map::new(), "Spider");
        let path = path.expect("unsupported kinds still save a canvas");
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or_default();
        assert!(name.starts_with("chart_radar_"));
        Ok(())
    }

    #[test]
    fn chart_save_failure_yields_none() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = offline_engine(temp.path())?;

        // Swap the output directory for a plain file so the PNG save fails.
        let dir = engine.config().output_dir.clone();
        std::fs::remove_dir_all(&dir)?;
        std::fs::write(&dir, b"in the way")?;

        let path = engine.generate_chart_image("bar", &Map::new(), "Revenue");
        assert_eq!(path, None);
        Ok(())
    }

    #[test]
    fn pick_prompt_is_deterministic_per_seed() {
        let prompts: &'static [&'static str] = &["one", "two", "three"];
        let first = pick_prompt(prompts, 7);
        let second = pick_prompt(prompts, 7);
        assert_eq!(first, second);
        assert!(prompts.contains(&first));
    }

    #[test]
    fn engine_emits_probe_and_artifact_events() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = offline_engine(temp.path())?;
        let _ = engine.generate_sector_image("Technology", "product", None)?;

        let raw = std::fs::read_to_string(temp.path().join("events.jsonl"))?;
        let types: Vec<String> = raw
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect();
        assert!(types.contains(&"engine_initialized".to_string()));
        assert!(types.contains(&"probe_completed".to_string()));
        assert!(types.contains(&"artifact_created".to_string()));
        Ok(())
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }
}
