//! End-to-end integration tests for market-report.
//!
//! Everything here runs the full pipeline in-process against the built-in
//! off-screen canvas or a test surface. The read-back tests at the bottom
//! need libpdfium and are gated behind the `E2E_ENABLED` environment variable
//! so they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture
//!
//! Including pdfium read-back:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --test e2e -- --nocapture

use chrono::NaiveDate;
use image::RgbaImage;
use market_report::engine::flow::DrawOp;
use market_report::model::Band;
use market_report::{
    generate_report, generate_report_sync, generate_report_to_file, generate_report_with_surface,
    inspect, inspect_bytes, render_preview, CancellationFlag, DistributionItem, GenerationConfig,
    MarketPriceTrendItem, ReportConfig, ReportError, ReportGenerator, ReportInputs, ReportProgressCallback,
    RenderSurface, SectionError, SectionHandle, SectionStatus, SentimentRow, TopPerformingCrop, TrendPoint,
    WatermarkSource,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn point(year: i32, month: u32, value: f64) -> TrendPoint {
    TrendPoint {
        date: NaiveDate::from_ymd_opt(year, month, 1).unwrap(),
        market_value: value,
        market_band: Band::new(value * 0.9, value * 1.1),
        confidence: Band::new(value * 0.85, value * 1.15),
    }
}

fn trend(name: &str, variety: &str, base: f64) -> MarketPriceTrendItem {
    MarketPriceTrendItem {
        crop_name: Some(name.into()),
        variety: Some(variety.into()),
        crop_type: Some("Leafy Greens".into()),
        historical: (1..=4).map(|m| point(2025, 8 + m, base + m as f64)).collect(),
        current: vec![point(2026, 3, base + 5.0)],
        forecast: (4..=7).map(|m| point(2026, m, base + m as f64)).collect(),
        ..Default::default()
    }
}

fn report_config() -> ReportConfig {
    ReportConfig {
        country: "UAE".into(),
        city: "Abu Dhabi".into(),
        crop_type: "Leafy-Greens".into(),
        currency: "AED".into(),
        weight: "kg".into(),
    }
}

/// Two crops with trend data, nothing optional.
fn scenario_a() -> ReportInputs {
    let mut inputs = ReportInputs::new(report_config(), ["kale-red_russian", "lettuce-romaine"]);
    inputs.price_trends = vec![
        trend("Kale", "Curly", 9.0),
        trend("Kale", "Red Russian", 12.0),
        trend("Lettuce", "Romaine", 6.0),
    ];
    inputs.generated_on = NaiveDate::from_ymd_opt(2026, 3, 18);
    inputs
}

/// One crop plus every optional section.
fn full_inputs() -> ReportInputs {
    let mut inputs = ReportInputs::new(report_config(), ["kale-red_russian"]);
    inputs.price_trends = vec![trend("Kale", "Red Russian", 12.0)];
    inputs.top_performers = vec![
        TopPerformingCrop {
            crop_name: Some("Basil".into()),
            variety: Some("Genovese".into()),
            rank: 2,
            average_price: 18.5,
            price_band: Band::new(16.0, 21.0),
            percent_change: -1.5,
            ..Default::default()
        },
        TopPerformingCrop {
            crop_name: Some("Mint".into()),
            rank: 1,
            average_price: 9.0,
            price_band: Band::new(8.0, 10.0),
            percent_change: 6.2,
            ..Default::default()
        },
    ];
    let items = |pairs: &[(&str, f64)]| -> Vec<DistributionItem> {
        pairs
            .iter()
            .map(|(l, p)| DistributionItem {
                label: l.to_string(),
                percentage: *p,
            })
            .collect()
    };
    inputs.regional_distribution = items(&[("Abu Dhabi", 45.0), ("Al Ain", 30.0), ("Al Dhafra", 25.0)]);
    inputs.product_type_distribution = items(&[("Fresh", 70.0), ("Packaged", 30.0)]);
    inputs.market_players_by_category = items(&[("Growers", 50.0), ("Importers", 35.0), ("Retail", 15.0)]);
    inputs.sentiment = vec![
        SentimentRow {
            source: "Chef Amal".into(),
            counts: BTreeMap::from([("kale".into(), 42), ("basil".into(), 7)]),
        },
        SentimentRow {
            source: "Grocer Weekly".into(),
            counts: BTreeMap::from([("kale".into(), 3), ("mint".into(), 19)]),
        },
    ];
    inputs.generated_on = NaiveDate::from_ymd_opt(2026, 3, 18);
    inputs
}

fn page_footer(artifact: &market_report::ReportArtifact, page: usize) -> bool {
    let total = artifact.pages.len();
    artifact.pages[page].contains_text(&format!("Page {} of {}", page + 1, total))
}

fn tiny_png() -> Vec<u8> {
    let img = RgbaImage::from_pixel(40, 20, image::Rgba([20, 90, 40, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Never commits any section.
struct StalledSurface;

impl RenderSurface for StalledSurface {
    async fn render_committed(&self, _section: SectionHandle) -> Result<(), SectionError> {
        std::future::pending().await
    }

    fn read_region(&self, _section: SectionHandle, _scale: u32) -> Result<RgbaImage, SectionError> {
        unreachable!("never committed")
    }
}

/// Records the capture order.
#[derive(Default)]
struct RecordingSurface {
    seen: Mutex<Vec<SectionHandle>>,
}

impl RenderSurface for RecordingSurface {
    async fn render_committed(&self, section: SectionHandle) -> Result<(), SectionError> {
        self.seen.lock().unwrap().push(section);
        Ok(())
    }

    fn read_region(&self, _section: SectionHandle, scale: u32) -> Result<RgbaImage, SectionError> {
        Ok(RgbaImage::from_pixel(300 * scale, 120 * scale, image::Rgba([0, 0, 0, 255])))
    }
}

/// Skip this test if E2E_ENABLED is not set.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run pdfium read-back tests");
            return;
        }
    }};
}

// ── Layout scenarios ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_two_crops_give_three_pages() {
    let artifact = generate_report(&scenario_a(), &GenerationConfig::default())
        .await
        .expect("generation");

    assert_eq!(artifact.stats.page_count, 3);
    assert_eq!(artifact.pages.len(), 3);
    for page in 0..3 {
        assert!(page_footer(&artifact, page), "missing footer on page {}", page + 1);
    }
    assert!(artifact.pages[0].contains_text("Market Summary"));
    assert!(artifact.pages[1].contains_text("Kale (Red Russian) Price Trend"));
    assert!(artifact.pages[2].contains_text("Lettuce (Romaine) Price Trend"));
    assert_eq!(artifact.pages[1].image_count(), 1);
    assert_eq!(artifact.stats.charts_embedded, 2);
    assert!(artifact.stats.warnings.is_empty(), "{:?}", artifact.stats.warnings);
    assert!(artifact.pdf.starts_with(b"%PDF-"));
    assert_eq!(artifact.stats.pdf_bytes, artifact.pdf.len());
}

#[tokio::test]
async fn test_unmatched_crop_gets_placeholder_and_no_image() {
    let mut inputs = scenario_a();
    inputs.selected_crop_keys = vec!["kale-lacinato".into()];

    let artifact = generate_report(&inputs, &GenerationConfig::default()).await.unwrap();

    assert_eq!(artifact.stats.page_count, 2);
    let trend_page = &artifact.pages[1];
    assert!(trend_page.contains_text("Market trend data not available for Kale (Lacinato)"));
    assert_eq!(trend_page.image_count(), 0);
    assert!(artifact.pages[0].contains_text("N/A"));
    assert_eq!(
        artifact.stats.warnings[0].error,
        SectionError::MissingMatch {
            key: "kale-lacinato".into()
        }
    );
    assert_eq!(artifact.stats.sections[1].status, SectionStatus::Degraded);
    assert_eq!(artifact.stats.sections[0].status, SectionStatus::Complete);
}

#[tokio::test]
async fn test_all_optional_sections() {
    let artifact = generate_report(&full_inputs(), &GenerationConfig::default())
        .await
        .unwrap();

    // Summary, one crop, three donuts over two pages, social trends.
    assert_eq!(artifact.stats.page_count, 5);
    let kinds: Vec<_> = artifact.stats.sections.iter().map(|s| s.kind.as_str()).collect();
    assert_eq!(kinds, ["summary", "crop_trend", "distribution", "social_trends"]);

    let summary = &artifact.pages[0];
    assert!(summary.contains_text("Top Performing Crops"));
    assert!(summary.contains_text("Basil (Genovese)"));
    assert!(summary.contains_text("Price (AED/kg)"));

    assert!(artifact.pages[2].contains_text("Regional Distribution"));
    assert!(artifact.pages[2].contains_text("Product Type Distribution"));
    assert!(artifact.pages[3].contains_text("Market Players by Category"));

    let social = &artifact.pages[4];
    assert!(social.contains_text("Social Media Trends"));
    assert!(social.contains_text("A = Chef Amal"));
    assert!(social.contains_text("B = Grocer Weekly"));
    assert!(social.contains_text("Mentions:"));
    assert_eq!(social.image_count(), 1);

    assert_eq!(artifact.stats.charts_embedded, 2);
    let distribution = &artifact.stats.sections[2];
    assert_eq!((distribution.first_page, distribution.last_page), (3, 4));
}

#[tokio::test]
async fn test_filename_from_report_parameters() {
    let artifact = generate_report(&scenario_a(), &GenerationConfig::default()).await.unwrap();
    assert_eq!(artifact.filename, "MarketTrend_Abu_Dhabi_Leafy-Greens_2026-03");
    assert_eq!(artifact.file_name(), "MarketTrend_Abu_Dhabi_Leafy-Greens_2026-03.pdf");
}

#[tokio::test]
async fn test_inputs_from_camel_case_json() {
    let json = r#"{
        "report": {"country": "UAE", "city": "Abu Dhabi", "cropType": "Herbs", "currency": "AED", "weight": "kg"},
        "selectedCropKeys": ["basil-genovese"],
        "priceTrends": [{
            "cropName": "Basil", "variety": "Genovese",
            "historical": [{"date": "2026-01-01", "market_value": 14.0}],
            "current": [{"date": "2026-02", "market_value": 15.5, "market_band": {"min": 14, "max": 17}}],
            "forecast": [{"date": "2026-03-01T00:00:00Z", "market_value": 16.0}]
        }],
        "topPerformers": [{"crop": "Basil", "rank": 1, "avgPrice": 15.5, "priceRange": {"min": 14, "max": 17}, "percentChange": 10.7}],
        "regionalDistribution": [{"region": "Abu Dhabi", "value": 60}, {"region": "Dubai", "value": 40}],
        "generatedOn": "2026-02-10"
    }"#;
    let inputs: ReportInputs = serde_json::from_str(json).unwrap();
    let artifact = generate_report(&inputs, &GenerationConfig::default()).await.unwrap();

    assert_eq!(artifact.filename, "MarketTrend_Abu_Dhabi_Herbs_2026-02");
    assert_eq!(artifact.stats.page_count, 3);
    assert!(artifact.pages[0].contains_text("+10.7%"));
    assert!(artifact.pages[2].contains_text("Abu Dhabi (60.0%)"));

    let stats_json = serde_json::to_value(&artifact.stats).unwrap();
    assert_eq!(stats_json["page_count"], 3);
}

#[tokio::test]
async fn test_sentiment_feed_with_fractional_counts_and_ids() {
    let json = r#"{
        "report": {"country": "UAE", "city": "Dubai", "cropType": "Herbs"},
        "selectedCropKeys": ["basil-genovese"],
        "priceTrends": [{"cropName": "Basil", "variety": "Genovese",
                         "current": [{"date": "2026-02-01", "market_value": 15.5}]}],
        "sentiment": [
            {"source": "Reddit", "id": "abc", "basil": 12.5, "mint": 3},
            {"source": "Chef Amal", "basil": -2, "mint": 40}
        ],
        "generatedOn": "2026-02-10"
    }"#;
    let inputs: ReportInputs = serde_json::from_str(json).expect("lenient sentiment rows");
    assert_eq!(inputs.sentiment[0].count("basil"), 13);
    assert_eq!(inputs.sentiment_columns(), ["basil", "mint"]);

    let artifact = generate_report(&inputs, &GenerationConfig::default()).await.unwrap();
    let social = artifact.pages.last().unwrap();
    assert!(social.contains_text("A = Reddit"));
    assert_eq!(social.image_count(), 1);
    assert!(artifact.stats.warnings.is_empty(), "{:?}", artifact.stats.warnings);
}

// ── Validation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_zero_and_too_many_crops_are_rejected() {
    let mut inputs = scenario_a();
    inputs.selected_crop_keys.clear();
    let err = generate_report(&inputs, &GenerationConfig::default()).await.unwrap_err();
    assert!(matches!(err, ReportError::NoCropsSelected { max: 3 }));

    inputs.selected_crop_keys = ["a-1", "b-2", "c-3", "d-4"].map(String::from).to_vec();
    let err = generate_report(&inputs, &GenerationConfig::default()).await.unwrap_err();
    assert!(matches!(err, ReportError::TooManyCrops { count: 4, max: 3 }));
}

#[tokio::test]
async fn test_invalid_selection_key() {
    let mut inputs = scenario_a();
    inputs.selected_crop_keys = vec!["-curly".into()];
    let err = generate_report(&inputs, &GenerationConfig::default()).await.unwrap_err();
    assert!(matches!(err, ReportError::InvalidSelectionKey { .. }));
}

// ── Run control ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancelled_before_start() {
    let flag = CancellationFlag::new();
    flag.cancel();
    let config = GenerationConfig::builder().cancellation(flag).build().unwrap();
    let err = generate_report(&scenario_a(), &config).await.unwrap_err();
    assert!(matches!(err, ReportError::Cancelled { ref section } if section == "Summary"));
}

/// Cancels once `after` sections have completed.
struct CancelAfter {
    flag: CancellationFlag,
    after: usize,
}

impl ReportProgressCallback for CancelAfter {
    fn on_section_complete(&self, index: usize, _total: usize, _name: &str) {
        if index >= self.after {
            self.flag.cancel();
        }
    }
}

#[tokio::test]
async fn test_cancelled_between_sections() {
    let flag = CancellationFlag::new();
    let config = GenerationConfig::builder()
        .cancellation(flag.clone())
        .progress_callback(Arc::new(CancelAfter { flag, after: 2 }))
        .build()
        .unwrap();
    let err = generate_report(&scenario_a(), &config).await.unwrap_err();
    assert!(
        matches!(err, ReportError::Cancelled { ref section } if section == "Lettuce (Romaine) trend"),
        "{err}"
    );
}

#[tokio::test]
async fn test_stalled_capture_times_out_without_failing_the_report() {
    let config = GenerationConfig::builder()
        .capture_timeout(Some(Duration::from_millis(50)))
        .build()
        .unwrap();
    let artifact = generate_report_with_surface(&scenario_a(), &config, &StalledSurface)
        .await
        .unwrap();

    assert_eq!(artifact.stats.charts_embedded, 0);
    assert_eq!(artifact.stats.warnings.len(), 2);
    assert!(matches!(
        artifact.stats.warnings[0].error,
        SectionError::CaptureTimeout { millis: 50, .. }
    ));
    assert!(artifact.pages[1].contains_text("Price chart unavailable"));
}

#[tokio::test]
async fn test_captures_run_in_section_order() {
    let surface = RecordingSurface::default();
    let artifact = generate_report_with_surface(&full_inputs(), &GenerationConfig::default(), &surface)
        .await
        .unwrap();
    assert_eq!(
        *surface.seen.lock().unwrap(),
        [SectionHandle::CropTrend(0), SectionHandle::SocialHeatmap]
    );
    assert_eq!(artifact.stats.charts_embedded, 2);
}

#[tokio::test]
async fn test_single_flight_rejects_overlap() {
    let generator = ReportGenerator::new();
    let inputs = scenario_a();
    let slow = GenerationConfig::builder()
        .capture_timeout(Some(Duration::from_millis(200)))
        .build()
        .unwrap();
    let fast = GenerationConfig::default();

    let (first, second) = tokio::join!(
        generator.generate_with_surface(&inputs, &slow, &StalledSurface),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            generator.generate(&inputs, &fast).await
        }
    );
    assert!(first.is_ok());
    assert!(matches!(second, Err(ReportError::GenerationInProgress)));

    // Released after the first run finished.
    assert!(!generator.is_busy());
    assert!(generator.generate(&inputs, &fast).await.is_ok());
}

#[tokio::test]
async fn test_progress_callback_sees_every_section() {
    #[derive(Default)]
    struct Counter {
        started: AtomicUsize,
        completed: AtomicUsize,
        warnings: AtomicUsize,
        pages: AtomicUsize,
    }
    impl ReportProgressCallback for Counter {
        fn on_section_start(&self, _i: usize, _t: usize, _n: &str) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_section_complete(&self, _i: usize, _t: usize, _n: &str) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_section_warning(&self, _i: usize, _n: &str, _w: &str) {
            self.warnings.fetch_add(1, Ordering::SeqCst);
        }
        fn on_generation_complete(&self, page_count: usize, _warnings: usize) {
            self.pages.store(page_count, Ordering::SeqCst);
        }
    }

    let counter = Arc::new(Counter::default());
    let config = GenerationConfig::builder()
        .progress_callback(counter.clone())
        .build()
        .unwrap();
    let mut inputs = scenario_a();
    inputs.selected_crop_keys.push("mint-".into());
    generate_report(&inputs, &config).await.unwrap();

    assert_eq!(counter.started.load(Ordering::SeqCst), 4);
    assert_eq!(counter.completed.load(Ordering::SeqCst), 4);
    assert_eq!(counter.warnings.load(Ordering::SeqCst), 1);
    assert_eq!(counter.pages.load(Ordering::SeqCst), 4);
}

// ── Watermark ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_watermark_is_stamped_beneath_every_page() {
    let config = GenerationConfig::builder()
        .watermark(WatermarkSource::Bytes(Arc::new(tiny_png())))
        .build()
        .unwrap();
    let artifact = generate_report(&scenario_a(), &config).await.unwrap();

    for page in &artifact.pages {
        assert!(matches!(page.ops.first(), Some(DrawOp::Image { .. })));
    }
    // Watermark images are not counted as charts.
    assert_eq!(artifact.stats.charts_embedded, 2);
    assert!(artifact.stats.warnings.is_empty());
}

#[tokio::test]
async fn test_missing_watermark_degrades_gracefully() {
    let config = GenerationConfig::builder()
        .watermark(WatermarkSource::Path("/no/such/logo.png".into()))
        .build()
        .unwrap();
    let artifact = generate_report(&scenario_a(), &config).await.unwrap();
    assert_eq!(artifact.stats.page_count, 3);
    assert!(matches!(
        artifact.stats.warnings[0].error,
        SectionError::WatermarkUnavailable { .. }
    ));
    assert_eq!(artifact.pages[0].image_count(), 0);
}

#[tokio::test]
async fn test_custom_footer_caption() {
    let config = GenerationConfig::builder()
        .footer_caption("Confidential - internal use")
        .build()
        .unwrap();
    let artifact = generate_report(&scenario_a(), &config).await.unwrap();
    assert!(artifact.pages.iter().all(|p| p.contains_text("Confidential - internal use")));
}

// ── File output ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_generate_to_file_writes_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("reports");
    let (path, stats) = generate_report_to_file(&scenario_a(), &target, &GenerationConfig::default())
        .await
        .unwrap();

    assert_eq!(path, target.join("MarketTrend_Abu_Dhabi_Leafy-Greens_2026-03.pdf"));
    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"%PDF-"));
    assert_eq!(bytes.len(), stats.pdf_bytes);
    // No temp file left behind.
    assert_eq!(std::fs::read_dir(&target).unwrap().count(), 1);
}

#[test]
fn test_sync_wrapper() {
    let artifact = generate_report_sync(&scenario_a(), &GenerationConfig::default()).unwrap();
    assert_eq!(artifact.stats.page_count, 3);
}

#[test]
fn test_noop_callback_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<market_report::NoopProgressCallback>();
    assert_send_sync::<ReportGenerator>();
    assert_send_sync::<market_report::OffscreenCanvas>();
}

// ── pdfium read-back ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_inspect_generated_report() {
    e2e_skip_unless_ready!();
    let artifact = generate_report(&full_inputs(), &GenerationConfig::default()).await.unwrap();
    let info = inspect_bytes(artifact.pdf.clone()).await.expect("inspect");
    assert_eq!(info.page_count, artifact.stats.page_count);
    assert!(info.is_a4_portrait(), "{:?}", info.page_sizes_mm);
    assert!(info
        .title
        .as_deref()
        .is_some_and(|t| t.starts_with("Market Intelligence Report")));
}

#[tokio::test]
async fn test_render_preview_of_written_file() {
    e2e_skip_unless_ready!();
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = generate_report_to_file(&scenario_a(), dir.path(), &GenerationConfig::default())
        .await
        .unwrap();

    let info = inspect(&path).await.unwrap();
    assert_eq!(info.page_count, 3);

    let thumb = render_preview(&path, 1, 400).await.unwrap();
    assert!(thumb.width() <= 400 && thumb.height() <= 400);

    let err = render_preview(&path, 9, 400).await.unwrap_err();
    assert!(matches!(err, ReportError::InspectFailed { .. }));
}

#[tokio::test]
async fn test_inspect_nonexistent() {
    e2e_skip_unless_ready!();
    let err = inspect(std::path::Path::new("/no/such/report.pdf")).await.unwrap_err();
    assert!(matches!(err, ReportError::InspectFailed { .. }));
}
