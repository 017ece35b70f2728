//! PNG charts rendered from a [`ReportSnapshot`] with `plotters`.
//!
//! Three charts are written to `<audit dir>/graphs/`:
//!
//! - `1_daily_articles.png`: one bar per date, partial first and last days
//!   greyed out, the busiest complete day highlighted, average as a red line
//! - `2_timeline.png`: counts over known dates on a calendar axis, with the
//!   peak and the first regime change marked
//! - `3_stats_summary.png`: headline figures and a comparison against the
//!   output of large newsrooms
//!
//! Each chart is drawn on a blocking thread into `<name>.tmp.png` and renamed
//! into place, so a reader never sees a half-encoded image.

use super::OutputError;
use crate::models::{PublishedDate, ReportSnapshot};
use crate::utils::group_thousands;
use chrono::{Datelike, NaiveDate, TimeDelta, Weekday};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::{fs, task};
use tracing::{info, instrument};

type DrawResult<T> = Result<T, Box<dyn Error>>;
type Panel<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

const FONT: &str = "sans-serif";
const CHART_SIZE: (u32, u32) = (1400, 800);
const SUMMARY_SIZE: (u32, u32) = (1600, 1200);

const BAR: RGBColor = RGBColor(0xFF, 0x6B, 0x6B);
const PEAK: RGBColor = RGBColor(0x4E, 0xCD, 0xC4);
const ACCENT: RGBColor = RGBColor(0x45, 0xB7, 0xD1);
const LINE: RGBColor = RGBColor(0xFF, 0xA0, 0x7A);
const REFERENCE: RGBColor = RGBColor(0x98, 0xD8, 0xC8);
const PARTIAL: RGBColor = RGBColor(0xCC, 0xCC, 0xCC);
const PANEL: RGBColor = RGBColor(0xF0, 0xF0, 0xF0);

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Estimated daily output of large newsrooms, for scale.
const NEWSROOMS: [(&str, f64); 3] = [("TechCrunch", 40.0), ("The Verge", 30.0), ("NY Times", 250.0)];

#[derive(Debug, Clone, Copy)]
enum Chart {
    DailyArticles,
    Timeline,
    StatsSummary,
}

impl Chart {
    const ALL: [Chart; 3] = [Chart::DailyArticles, Chart::Timeline, Chart::StatsSummary];

    fn stem(self) -> &'static str {
        match self {
            Chart::DailyArticles => "1_daily_articles",
            Chart::Timeline => "2_timeline",
            Chart::StatsSummary => "3_stats_summary",
        }
    }

    /// Draw into `path`; `Ok(false)` when the report has nothing to plot.
    fn draw(self, path: &Path, report: &ReportSnapshot, site: &str, regime_threshold: usize) -> DrawResult<bool> {
        match self {
            Chart::DailyArticles => draw_daily_articles(path, report, site),
            Chart::Timeline => draw_timeline(path, report, regime_threshold),
            Chart::StatsSummary => draw_stats_summary(path, report, site),
        }
    }
}

/// Renders report charts into a directory.
#[derive(Debug, Clone)]
pub struct Visualizer {
    graphs_dir: PathBuf,
    site_label: String,
    regime_threshold: usize,
}

impl Visualizer {
    pub fn new(audit_dir: &Path, site_label: &str, regime_threshold: usize) -> Self {
        Self {
            graphs_dir: audit_dir.join("graphs"),
            site_label: site_label.to_string(),
            regime_threshold,
        }
    }

    /// Render every chart the report has data for and return the written paths.
    #[instrument(level = "info", skip_all, fields(dir = %self.graphs_dir.display()))]
    pub async fn render(&self, report: &ReportSnapshot) -> Result<Vec<PathBuf>, OutputError> {
        fs::create_dir_all(&self.graphs_dir)
            .await
            .map_err(|e| OutputError::Io {
                path: self.graphs_dir.clone(),
                source: e,
            })?;

        let mut written = Vec::new();
        for chart in Chart::ALL {
            let path = self.graphs_dir.join(format!("{}.png", chart.stem()));
            let tmp_path = self.graphs_dir.join(format!("{}.tmp.png", chart.stem()));

            let (tmp, report, site, threshold) = (
                tmp_path.clone(),
                report.clone(),
                self.site_label.clone(),
                self.regime_threshold,
            );
            let drawn = task::spawn_blocking(move || {
                chart
                    .draw(&tmp, &report, &site, threshold)
                    .map_err(|e| e.to_string())
            })
            .await
            .map_err(|e| OutputError::Render(e.to_string()))?
            .map_err(OutputError::Render)?;

            if !drawn {
                info!(chart = chart.stem(), "Not enough data; skipping chart");
                continue;
            }
            fs::rename(&tmp_path, &path)
                .await
                .map_err(|e| OutputError::Io {
                    path: path.clone(),
                    source: e,
                })?;
            info!(chart = %path.display(), "Created chart");
            written.push(path);
        }
        Ok(written)
    }
}

/// First known day whose article count reaches `threshold`.
pub fn regime_change(report: &ReportSnapshot, threshold: usize) -> Option<NaiveDate> {
    known_days(report)
        .into_iter()
        .find(|(_, count)| *count >= threshold)
        .map(|(date, _)| date)
}

/// Busiest day, ignoring the partial first and last day when possible.
pub fn peak_day(report: &ReportSnapshot) -> Option<(NaiveDate, usize)> {
    let known = known_days(report);
    let complete = if known.len() > 2 {
        &known[1..known.len() - 1]
    } else {
        &known[..]
    };
    // Earliest date wins a tie.
    complete
        .iter()
        .copied()
        .fold(None, |best: Option<(NaiveDate, usize)>, day| match best {
            Some(b) if b.1 >= day.1 => Some(b),
            _ => Some(day),
        })
}

/// Calendar guide dates, spaced according to how many days the axis spans:
/// yearly past two years, quarterly past 90 days, every other Monday past
/// 30 days, otherwise daily.
pub fn calendar_ticks(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    let span = (last - first).num_days();
    first
        .iter_days()
        .take_while(|d| *d <= last)
        .filter(|d| {
            if span > 365 * 2 {
                d.month() == 1 && d.day() == 1
            } else if span > 90 {
                d.day() == 1 && (d.month() - 1) % 3 == 0
            } else if span > 30 {
                d.weekday() == Weekday::Mon && ((*d - first).num_days() / 7) % 2 == 0
            } else {
                true
            }
        })
        .collect()
}

/// Axis label format matching the spacing of [`calendar_ticks`].
fn tick_format(span_days: i64) -> &'static str {
    if span_days > 365 * 2 {
        "%Y"
    } else if span_days > 90 {
        "%b %Y"
    } else {
        "%b %d"
    }
}

fn known_days(report: &ReportSnapshot) -> Vec<(NaiveDate, usize)> {
    report
        .daily_statistics
        .articles_per_day
        .iter()
        .filter_map(|(date, count)| date.known().map(|d| (d, *count)))
        .collect()
}

fn is_partial(report: &ReportSnapshot, date: PublishedDate) -> bool {
    date.is_known()
        && (report.date_range.earliest == Some(date) || report.date_range.latest == Some(date))
}

fn date_range_label(report: &ReportSnapshot) -> String {
    let show = |d: Option<PublishedDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "n/a".to_string());
    format!(
        "{} to {}",
        show(report.date_range.earliest),
        show(report.date_range.latest)
    )
}

fn seconds_between_articles(per_day: f64) -> f64 {
    if per_day > 0.0 {
        SECONDS_PER_DAY / per_day
    } else {
        0.0
    }
}

fn bold(size: i32) -> TextStyle<'static> {
    TextStyle::from((FONT, size).into_font().style(FontStyle::Bold))
}

fn draw_daily_articles(path: &Path, report: &ReportSnapshot, site: &str) -> DrawResult<bool> {
    let per_day: Vec<(PublishedDate, usize)> = report
        .daily_statistics
        .articles_per_day
        .iter()
        .map(|(date, count)| (*date, *count))
        .collect();
    if per_day.is_empty() {
        return Ok(false);
    }

    let n = per_day.len() as i32;
    let max_count = per_day.iter().map(|(_, c)| *c).max().unwrap_or(0).max(1) as f64;
    let scale_max = max_count * 1.15;
    let peak = peak_day(report).map(|(d, _)| PublishedDate::Known(d));
    let average = report.daily_statistics.average_per_day;
    let labels: Vec<String> = per_day.iter().map(|(d, _)| d.to_string()).collect();

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(&format!("{site}: Daily Article Production"), bold(28))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!(
                "Data Period: {} (first and last days excluded from the average)",
                date_range_label(report)
            ),
            (FONT, 18),
        )
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d((0..n).into_segmented(), 0f64..scale_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(per_day.len().min(31))
        .x_label_formatter(&|v| match v {
            SegmentValue::CenterOf(i) => labels.get(*i as usize).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .y_label_formatter(&|y| group_thousands(y.round() as u64))
        .x_desc("Date")
        .y_desc("Number of Articles")
        .axis_desc_style(bold(16))
        .draw()?;

    chart.draw_series(per_day.iter().enumerate().map(|(i, (date, count))| {
        let color = if is_partial(report, *date) {
            PARTIAL
        } else if Some(*date) == peak {
            PEAK
        } else {
            BAR
        };
        let i = i as i32;
        let mut bar = Rectangle::new(
            [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), *count as f64)],
            color.mix(0.85).filled(),
        );
        bar.set_margin(0, 0, 4, 4);
        bar
    }))?;

    let above = bold(13).pos(Pos::new(HPos::Center, VPos::Bottom));
    chart.draw_series(per_day.iter().enumerate().map(|(i, (date, count))| {
        let mut label = group_thousands(*count as u64);
        if is_partial(report, *date) {
            label.push_str(" (partial)");
        }
        Text::new(label, (SegmentValue::CenterOf(i as i32), *count as f64), above.clone())
    }))?;

    chart
        .draw_series(LineSeries::new(
            [(SegmentValue::Exact(0), average), (SegmentValue::Exact(n), average)],
            RED.stroke_width(2),
        ))?
        .label(format!(
            "Average: {} articles/day (excl. partial days)",
            group_thousands(average.round() as u64)
        ))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(2)));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8).filled())
        .border_style(BLACK.stroke_width(1))
        .label_font((FONT, 14))
        .draw()?;

    root.present()?;
    Ok(true)
}

fn draw_timeline(path: &Path, report: &ReportSnapshot, regime_threshold: usize) -> DrawResult<bool> {
    let days = known_days(report);
    let (Some(&(first, _)), Some(&(last, _))) = (days.first(), days.last()) else {
        return Ok(false);
    };

    let span = (last - first).num_days();
    let offset = |d: NaiveDate| (d - first).num_days();
    let max_count = days.iter().map(|(_, c)| *c).max().unwrap_or(0).max(1) as f64;
    let scale_max = max_count * 1.15;
    let average = report.daily_statistics.average_per_day;
    let label_format = tick_format(span);

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(
        &format!("Publication Timeline: {}", date_range_label(report)),
        bold(28),
    )?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!(
                "Average: 1 article every {:.1} seconds (excl. partial days); grey markers are incomplete days",
                seconds_between_articles(average)
            ),
            (FONT, 18),
        )
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(-1i64..span + 1, 0f64..scale_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(12)
        .x_label_formatter(&|x| {
            first
                .checked_add_signed(TimeDelta::days(*x))
                .map(|d| d.format(label_format).to_string())
                .unwrap_or_default()
        })
        .y_label_formatter(&|y| group_thousands(y.round() as u64))
        .x_desc("Date")
        .y_desc("Articles Published")
        .axis_desc_style(bold(16))
        .draw()?;

    chart.draw_series(calendar_ticks(first, last).into_iter().map(|d| {
        let x = offset(d);
        PathElement::new(vec![(x, 0.0), (x, scale_max)], BLACK.mix(0.1).stroke_width(1))
    }))?;

    chart.draw_series(
        AreaSeries::new(
            days.iter().map(|(d, c)| (offset(*d), *c as f64)),
            0.0,
            LINE.mix(0.3).filled(),
        )
        .border_style(LINE.stroke_width(3)),
    )?;

    chart.draw_series(days.iter().map(|(d, c)| {
        let color = if is_partial(report, PublishedDate::Known(*d)) {
            PARTIAL
        } else {
            LINE
        };
        Circle::new((offset(*d), *c as f64), 6, color.filled())
    }))?;

    chart
        .draw_series(LineSeries::new(
            [(-1, average), (span + 1, average)],
            RED.mix(0.7).stroke_width(2),
        ))?
        .label("Average (complete days)")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(2)));

    if let Some((date, count)) = peak_day(report) {
        chart
            .draw_series(std::iter::once(Circle::new(
                (offset(date), count as f64),
                12,
                RED.stroke_width(3),
            )))?
            .label(format!("Peak: {} articles ({date})", group_thousands(count as u64)))
            .legend(|(x, y)| Circle::new((x + 10, y), 6, RED.stroke_width(3)));
    }

    if let Some(date) = regime_change(report, regime_threshold) {
        let x = offset(date);
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(x, 0.0), (x, scale_max)],
                ACCENT.stroke_width(2),
            )))?
            .label(format!(
                "{} articles/day first reached on {date}",
                group_thousands(regime_threshold as u64)
            ))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], ACCENT.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8).filled())
        .border_style(BLACK.stroke_width(1))
        .label_font((FONT, 14))
        .draw()?;

    root.present()?;
    Ok(true)
}

fn headline_panel(
    area: &Panel<'_>,
    figure: &str,
    caption: &str,
    note: Option<&str>,
    color: RGBColor,
) -> DrawResult<()> {
    let area = area.margin(10, 10, 10, 10);
    area.fill(&PANEL)?;
    let (w, h) = area.dim_in_pixel();
    let (cx, h) = ((w / 2) as i32, h as i32);
    let centered = Pos::new(HPos::Center, VPos::Center);

    area.draw(&Text::new(
        figure.to_string(),
        (cx, h * 2 / 5),
        (FONT, 80).into_font().style(FontStyle::Bold).color(&color).pos(centered),
    ))?;
    area.draw(&Text::new(caption.to_string(), (cx, h * 3 / 5), bold(24).pos(centered)))?;
    if let Some(note) = note {
        area.draw(&Text::new(
            note.to_string(),
            (cx, h * 4 / 5),
            (FONT, 18).into_font().style(FontStyle::Italic).color(&RED).pos(centered),
        ))?;
    }
    Ok(())
}

fn comparison_panel(area: &Panel<'_>, site: &str, average: f64) -> DrawResult<()> {
    let mut rows: Vec<(String, f64, RGBColor)> = NEWSROOMS
        .iter()
        .map(|(name, value)| (name.to_string(), *value, REFERENCE))
        .collect();
    rows.push((site.to_string(), average, BAR));
    let max_value = rows.iter().map(|(_, v, _)| *v).fold(1.0, f64::max);
    let names: Vec<String> = rows.iter().map(|(name, _, _)| name.clone()).collect();

    let mut chart = ChartBuilder::on(area)
        .caption("Comparison: Daily Output (industry estimates)", bold(20))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(150)
        .build_cartesian_2d(0f64..max_value * 1.2, (0..rows.len() as i32).into_segmented())?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(rows.len())
        .y_label_formatter(&|v| match v {
            SegmentValue::CenterOf(i) => names.get(*i as usize).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .x_label_formatter(&|x| group_thousands(x.round() as u64))
        .x_desc("Articles per day")
        .draw()?;

    chart.draw_series(rows.iter().enumerate().map(|(i, (_, value, color))| {
        let i = i as i32;
        let mut bar = Rectangle::new(
            [(0.0, SegmentValue::Exact(i)), (*value, SegmentValue::Exact(i + 1))],
            color.filled(),
        );
        bar.set_margin(10, 10, 0, 0);
        bar
    }))?;

    let beside = bold(14).pos(Pos::new(HPos::Left, VPos::Center));
    chart.draw_series(rows.iter().enumerate().map(|(i, (_, value, _))| {
        Text::new(
            format!(" {}", group_thousands(value.round() as u64)),
            (*value, SegmentValue::CenterOf(i as i32)),
            beside.clone(),
        )
    }))?;
    Ok(())
}

fn draw_stats_summary(path: &Path, report: &ReportSnapshot, site: &str) -> DrawResult<bool> {
    if report.total_articles == 0 {
        return Ok(false);
    }

    let average = report.daily_statistics.average_per_day;
    let peak = report.daily_statistics.max_per_day;

    let root = BitMapBackend::new(path, SUMMARY_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(
        &format!(
            "{site}: Statistical Analysis ({})",
            date_range_label(report)
        ),
        bold(30),
    )?;
    let panels = root.margin(10, 10, 10, 10).split_evenly((2, 2));

    headline_panel(
        &panels[0],
        &group_thousands(report.total_articles as u64),
        "Articles Documented",
        None,
        BAR,
    )?;
    let every = format!("1 article every {:.1} seconds", seconds_between_articles(average));
    headline_panel(
        &panels[1],
        &group_thousands(average.round() as u64),
        "Articles Per Day (Average)",
        Some(&every),
        PEAK,
    )?;
    let peak_every = format!(
        "1 article every {:.1} seconds",
        seconds_between_articles(peak as f64)
    );
    headline_panel(
        &panels[2],
        &group_thousands(peak as u64),
        "Peak Day (Maximum)",
        Some(&peak_every),
        ACCENT,
    )?;
    comparison_panel(&panels[3], site, average)?;

    root.present()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleRecord;
    use crate::report;
    use crate::store::ArticleStore;

    const PNG_MAGIC: [u8; 4] = [0x89, b'P', b'N', b'G'];

    fn report_for(days: &[(&str, usize)]) -> ReportSnapshot {
        let mut store = ArticleStore::new();
        let mut id = 0;
        for (date, count) in days {
            for _ in 0..*count {
                id += 1;
                store.upsert(ArticleRecord {
                    url: format!("https://example.com/blog/{id}"),
                    title: "T".to_string(),
                    date_raw: String::new(),
                    date_parsed: PublishedDate::from(date.to_string()),
                    page_number: 1,
                    archive_url: None,
                });
            }
        }
        report::build(&store)
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn is_png(path: &Path) -> bool {
        std::fs::read(path).map(|b| b.starts_with(&PNG_MAGIC)).unwrap_or(false)
    }

    #[test]
    fn test_peak_ignores_partial_days() {
        let report = report_for(&[("2024-01-01", 90), ("2024-01-02", 10), ("2024-01-03", 20), ("2024-01-04", 95)]);
        assert_eq!(peak_day(&report), Some((date("2024-01-03"), 20)));
    }

    #[test]
    fn test_regime_change_is_first_day_at_threshold() {
        let report = report_for(&[("2024-01-01", 3), ("2024-01-02", 12), ("2024-01-03", 4), ("2024-01-04", 15)]);
        assert_eq!(regime_change(&report, 10), Some(date("2024-01-02")));
        assert_eq!(regime_change(&report, 50), None);
    }

    #[test]
    fn test_calendar_ticks_adapt_to_span() {
        let daily = calendar_ticks(date("2024-01-01"), date("2024-01-10"));
        assert_eq!(daily.len(), 10);
        assert_eq!(daily[0].format(tick_format(9)).to_string(), "Jan 01");

        let yearly = calendar_ticks(date("2020-06-01"), date("2024-06-01"));
        let labels: Vec<String> = yearly.iter().map(|d| d.format(tick_format(1461)).to_string()).collect();
        assert_eq!(labels, ["2021", "2022", "2023", "2024"]);

        let quarterly = calendar_ticks(date("2024-01-15"), date("2024-12-31"));
        assert_eq!(quarterly.len(), 3);
        assert_eq!(quarterly[0].format(tick_format(351)).to_string(), "Apr 2024");
    }

    #[test]
    fn test_charts_draw_png_for_typical_report() {
        let dir = tempfile::tempdir().unwrap();
        let report = report_for(&[("2024-01-01", 5), ("2024-01-02", 100), ("2024-01-03", 7), ("UNKNOWN_DATE", 1)]);

        for chart in Chart::ALL {
            let path = dir.path().join(format!("{}.png", chart.stem()));
            assert!(chart.draw(&path, &report, "Example & Co", 50).unwrap());
            assert!(is_png(&path), "{} is not a PNG", chart.stem());
        }
    }

    #[test]
    fn test_empty_and_undated_reports_skip_charts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");

        let empty = report_for(&[]);
        for chart in Chart::ALL {
            assert!(!chart.draw(&path, &empty, "x", 10).unwrap());
        }
        assert!(!path.exists());

        let undated = report_for(&[("UNKNOWN_DATE", 2)]);
        assert!(!Chart::Timeline.draw(&path, &undated, "x", 10).unwrap());
        assert!(Chart::DailyArticles.draw(&path, &undated, "x", 10).unwrap());
    }

    #[tokio::test]
    async fn test_render_writes_png_files() {
        let dir = tempfile::tempdir().unwrap();
        let report = report_for(&[("2024-01-01", 5), ("2024-01-02", 100), ("2024-01-03", 7)]);
        let written = Visualizer::new(dir.path(), "Example", 50).render(&report).await.unwrap();

        let graphs = dir.path().join("graphs");
        assert_eq!(
            written,
            vec![
                graphs.join("1_daily_articles.png"),
                graphs.join("2_timeline.png"),
                graphs.join("3_stats_summary.png"),
            ]
        );
        assert!(written.iter().all(|p| is_png(p)));
        assert!(!graphs.join("2_timeline.tmp.png").exists());
    }
}
