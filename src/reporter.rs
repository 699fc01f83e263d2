use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::config::{REPORT_CATEGORY_TOP_N, REPORT_TOP_N};
use crate::error::Result;
use crate::types::TrendResult;

/// Render the daily Markdown report: a top list followed by per-category
/// sections (only when category data is present).
pub fn markdown_report(
    trends: &[TrendResult],
    category_trends: &[(String, Vec<TrendResult>)],
) -> String {
    let mut lines: Vec<String> = vec![
        "# EcomTrendAI Trend Report".to_string(),
        String::new(),
        format!("**Generated**: {}", Utc::now().format("%Y-%m-%d %H:%M")),
        String::new(),
        "---".to_string(),
        String::new(),
        format!("## Top Movers — TOP {REPORT_TOP_N}"),
        String::new(),
    ];

    for (i, trend) in trends.iter().take(REPORT_TOP_N).enumerate() {
        let price = trend
            .price
            .map(|p| format!("{p:.0}"))
            .unwrap_or_else(|| "price unknown".to_string());
        let rating = trend
            .rating
            .map(|r| format!("★{r:.1}"))
            .unwrap_or_default();
        lines.push(format!(
            "{}. **[{}]({})**  ",
            i + 1,
            truncate_chars(&trend.name, 40),
            trend.affiliate_url,
        ));
        lines.push(format!(
            "   - rank change: +{:.0}% | score: {} | {} {}",
            trend.rank_change_percent, trend.trend_score, price, rating,
        ));
        lines.push(format!("   - category: {}", trend.category));
        lines.push(String::new());
    }

    if !category_trends.is_empty() {
        lines.push("---".to_string());
        lines.push(String::new());
        lines.push("## Trends by Category".to_string());
        lines.push(String::new());

        for (category, items) in category_trends {
            lines.push(format!("### {category}"));
            lines.push(String::new());
            for (i, trend) in items.iter().take(REPORT_CATEGORY_TOP_N).enumerate() {
                lines.push(format!(
                    "{}. [{}...]({}) (+{:.0}%)",
                    i + 1,
                    truncate_chars(&trend.name, 30),
                    trend.affiliate_url,
                    trend.rank_change_percent,
                ));
            }
            lines.push(String::new());
        }
    }

    lines.extend([
        "---".to_string(),
        String::new(),
        "*This report was generated automatically by EcomTrendAI.*".to_string(),
        String::new(),
        "*Product links carry an affiliate tag.*".to_string(),
    ]);

    lines.join("\n")
}

/// Write the Markdown report into `output_dir` as `trends_YYYYMMDD.md`.
pub fn write_markdown_report(
    output_dir: &Path,
    trends: &[TrendResult],
    category_trends: &[(String, Vec<TrendResult>)],
) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let filename = format!("trends_{}.md", Utc::now().format("%Y%m%d"));
    let filepath = output_dir.join(filename);
    fs::write(&filepath, markdown_report(trends, category_trends))?;
    Ok(filepath)
}

/// CSV export of ranked trends, one row per product.
pub fn csv_export(trends: &[TrendResult]) -> String {
    let mut out = String::from("name,asin,category,current_rank,rank_change_percent,price\n");
    for trend in trends {
        let price = trend.price.map(|p| p.to_string()).unwrap_or_default();
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            csv_field(&trend.name),
            csv_field(&trend.asin),
            csv_field(&trend.category),
            trend.current_rank,
            trend.rank_change_percent,
            price,
        ));
    }
    out
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn csv_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

/// Character-based truncation — product names are routinely multi-byte.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn trend(asin: &str, name: &str, category: &str, price: Option<f64>) -> TrendResult {
        TrendResult {
            asin: asin.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            current_rank: 1,
            rank_change_percent: 100.0,
            price,
            review_count: Some(500),
            rating: price.map(|_| 4.5),
            affiliate_url: format!("https://example.com/dp/{asin}?tag=t"),
            trend_score: 90.0,
        }
    }

    fn sample_trends() -> Vec<TrendResult> {
        (0..12)
            .map(|i| {
                trend(
                    &format!("B{i:03}"),
                    &format!("Test Product {i}"),
                    "electronics",
                    Some(100.0),
                )
            })
            .collect()
    }

    #[test]
    fn report_contains_title_top_list_and_categories() {
        let trends = sample_trends();
        let categories = vec![
            ("electronics".to_string(), trends[..4].to_vec()),
            ("games".to_string(), trends[4..8].to_vec()),
        ];

        let report = markdown_report(&trends, &categories);
        assert!(report.contains("# EcomTrendAI Trend Report"));
        assert!(report.contains("## Top Movers — TOP 10"));
        assert!(report.contains("## Trends by Category"));
        assert!(report.contains("### electronics"));
        assert!(report.contains("### games"));
        assert!(report.contains("Test Product 0"));
        assert!(report.contains("Test Product 9"));
        // Only the first ten make the top list.
        assert!(!report.contains("11. **["));
        assert!(report.contains("generated automatically"));
        assert!(report.contains("affiliate tag"));
    }

    #[test]
    fn report_handles_missing_price_and_rating() {
        let item = trend("B999", "No Price Product", "misc", None);
        let report = markdown_report(&[item], &[]);
        assert!(report.contains("No Price Product"));
        assert!(report.contains("price unknown"));
    }

    #[test]
    fn report_without_categories_skips_the_section() {
        let report = markdown_report(&sample_trends(), &[]);
        assert!(!report.contains("## Trends by Category"));
    }

    #[test]
    fn empty_trends_still_produce_a_report_skeleton() {
        let report = markdown_report(&[], &[]);
        assert!(report.contains("# EcomTrendAI Trend Report"));
        assert!(report.contains("## Top Movers"));
    }

    #[test]
    fn long_names_are_truncated_on_char_boundaries() {
        let item = trend("B998", &"あ".repeat(60), "misc", Some(10.0));
        let report = markdown_report(&[item], &[]);
        assert!(report.contains(&"あ".repeat(40)));
        assert!(!report.contains(&"あ".repeat(41)));
    }

    #[test]
    fn write_creates_directory_and_datestamped_file() {
        let dir = TempDir::new().expect("tempdir");
        let output_dir = dir.path().join("reports");

        let path = write_markdown_report(&output_dir, &sample_trends(), &[]).expect("write");
        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("md"));
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("trends_"))
            .unwrap_or(false));
    }

    #[test]
    fn csv_has_header_and_one_row_per_trend() {
        let trends = vec![
            trend("B001", "Plain Name", "electronics", Some(19.99)),
            trend("B002", "Name, with comma", "games", None),
        ];
        let csv = csv_export(&trends);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "name,asin,category,current_rank,rank_change_percent,price"
        );
        assert!(lines[1].contains("Plain Name"));
        assert!(lines[2].contains("\"Name, with comma\""));
        // Missing price serializes as an empty trailing field.
        assert!(lines[2].ends_with(','));
    }

    #[test]
    fn csv_escapes_embedded_quotes() {
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("plain"), "plain");
    }
}
