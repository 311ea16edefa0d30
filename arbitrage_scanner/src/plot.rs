//! Plotly figures for price tables.
//!
//! Figures are plain Plotly JSON (`{"data": [...], "layout": {...}}`) so they
//! can be handed to any Plotly front end, or written as a self-contained HTML
//! page with [`Figure::write_html`].

use std::path::Path;

use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::table::{Table, TableError};

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

/// A Plotly figure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    /// Traces.
    pub data: Vec<Value>,
    /// Layout object.
    pub layout: Value,
}

impl Figure {
    /// The figure as a JSON value.
    pub fn to_json(&self) -> Value {
        json!({ "data": self.data, "layout": self.layout })
    }

    /// A standalone HTML page that renders the figure with plotly.js.
    pub fn to_html(&self) -> String {
        // keep "</script>" inside string values from closing the tag
        let figure = self.to_json().to_string().replace("</", "<\\/");
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<script src="{PLOTLY_CDN}"></script>
</head>
<body>
<div id="figure" style="width:100%;height:90vh;"></div>
<script>
const figure = {figure};
Plotly.newPlot("figure", figure.data, figure.layout, {{responsive: true}});
</script>
</body>
</html>
"#
        )
    }

    /// Writes [`to_html`](Self::to_html) to `path`.
    pub fn write_html(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, self.to_html())
    }
}

/// Options for [`line_chart`].
#[derive(Debug, Clone, Default)]
pub struct LineChartOptions {
    /// Figure title.
    pub title: Option<String>,
    /// Give every column its own y-axis.
    pub separate_y_axis: bool,
    /// Start with all traces hidden; they can be toggled from the legend.
    pub hidden: bool,
}

/// One line per column against the table's timestamp index.
///
/// Missing cells are `null` and show as gaps.
pub fn line_chart(table: &Table, options: &LineChartOptions) -> Figure {
    let x: Vec<String> = table
        .index()
        .iter()
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
        .collect();

    let mut data = Vec::with_capacity(table.n_columns());
    let mut layout = Map::new();
    for (i, name) in table.column_names().enumerate() {
        let y = table.column(name).unwrap_or_default();
        let mut trace = json!({
            "type": "scatter",
            "mode": "lines",
            "name": name,
            "x": x,
            "y": y,
        });
        if options.hidden {
            trace["visible"] = json!("legendonly");
        }
        if options.separate_y_axis {
            trace["yaxis"] = json!(axis_ref(i));
            layout.insert(axis_key(i), axis_layout(i, name));
        }
        data.push(trace);
    }

    if let Some(title) = &options.title {
        layout.insert("title".into(), json!({ "text": title }));
    }
    layout.insert("xaxis".into(), json!({ "type": "date" }));
    if !options.separate_y_axis {
        layout.insert("yaxis".into(), json!({ "title": { "text": "close" } }));
    }
    Figure {
        data,
        layout: Value::Object(layout),
    }
}

/// `y`, `y2`, `y3`, ... as referenced by traces.
fn axis_ref(i: usize) -> String {
    match i {
        0 => "y".to_string(),
        _ => format!("y{}", i + 1),
    }
}

/// `yaxis`, `yaxis2`, ... as keyed in the layout.
fn axis_key(i: usize) -> String {
    match i {
        0 => "yaxis".to_string(),
        _ => format!("yaxis{}", i + 1),
    }
}

fn axis_layout(i: usize, title: &str) -> Value {
    let mut axis = json!({ "title": { "text": title } });
    if i > 0 {
        axis["overlaying"] = json!("y");
        axis["side"] = json!(if i % 2 == 1 { "right" } else { "left" });
        axis["showgrid"] = json!(false);
    }
    axis
}

/// Options for [`correlation_heatmap`].
#[derive(Debug, Clone)]
pub struct HeatmapOptions {
    /// Figure title.
    pub title: Option<String>,
    /// Fix the colour scale to [-1, 1] instead of the observed range.
    pub clamp: bool,
}

impl Default for HeatmapOptions {
    fn default() -> Self {
        Self {
            title: None,
            clamp: true,
        }
    }
}

/// Pearson correlation matrix of the table's columns as a heatmap.
///
/// Undefined correlations are `null` cells.
pub fn correlation_heatmap(
    table: &Table,
    options: &HeatmapOptions,
) -> Result<Figure, TableError> {
    let corr = table.correlation()?;
    let z: Vec<Vec<Option<f64>>> = corr
        .values
        .iter()
        .map(|row| row.iter().map(|v| (!v.is_nan()).then_some(*v)).collect())
        .collect();

    let mut trace = json!({
        "type": "heatmap",
        "x": corr.labels,
        "y": corr.labels,
        "z": z,
        "colorscale": "RdBu",
    });
    if options.clamp {
        trace["zmin"] = json!(-1.0);
        trace["zmax"] = json!(1.0);
    }

    let mut layout = json!({ "yaxis": { "autorange": "reversed" } });
    if let Some(title) = &options.title {
        layout["title"] = json!({ "text": title });
    }
    Ok(Figure {
        data: vec![trace],
        layout,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{series::PriceSeries, table::merge_series};

    fn table() -> Table {
        let day = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
        let btc = PriceSeries::from_points(
            "BTC/USDT",
            [(day(1), 100.0), (day(2), 101.0), (day(3), 99.0)],
        );
        let eth = PriceSeries::from_points("ETH/USDT", [(day(2), 10.0), (day(3), 12.0)]);
        merge_series([&btc, &eth]).unwrap()
    }

    #[test]
    fn line_chart_has_one_trace_per_column() {
        let figure = line_chart(&table(), &LineChartOptions::default());
        assert_eq!(figure.data.len(), 2);
        assert_eq!(figure.data[0]["name"], "BTC/USDT");
        assert_eq!(figure.data[0]["x"][0], "2024-01-01T00:00:00Z");
        assert_eq!(figure.data[1]["y"], json!([null, 10.0, 12.0]));
        assert!(figure.data[0].get("visible").is_none());
        assert!(figure.layout.get("yaxis2").is_none());
    }

    #[test]
    fn separate_axes_and_hidden_traces() {
        let options = LineChartOptions {
            title: Some("closes".into()),
            separate_y_axis: true,
            hidden: true,
        };
        let figure = line_chart(&table(), &options);
        assert_eq!(figure.data[1]["yaxis"], "y2");
        assert_eq!(figure.data[1]["visible"], "legendonly");
        assert_eq!(figure.layout["yaxis2"]["overlaying"], "y");
        assert_eq!(figure.layout["yaxis"]["title"]["text"], "BTC/USDT");
        assert_eq!(figure.layout["title"]["text"], "closes");
    }

    #[test]
    fn heatmap_clamps_to_the_unit_range() {
        let figure = correlation_heatmap(&table(), &HeatmapOptions::default()).unwrap();
        let trace = &figure.data[0];
        assert_eq!(trace["zmin"], -1.0);
        assert_eq!(trace["zmax"], 1.0);
        assert_eq!(trace["z"][0][0], 1.0);
        // two shared rows, opposite direction
        let r = trace["z"][0][1].as_f64().unwrap();
        assert!((r + 1.0).abs() < 1e-9);

        let unclamped = correlation_heatmap(
            &table(),
            &HeatmapOptions {
                clamp: false,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(unclamped.data[0].get("zmin").is_none());
    }

    #[test]
    fn html_embeds_the_figure_safely() {
        let mut figure = line_chart(&table(), &LineChartOptions::default());
        figure.layout["title"] = json!({ "text": "</script><b>" });
        let html = figure.to_html();
        assert!(html.contains(PLOTLY_CDN));
        assert!(html.contains("<\\/script><b>"));
        assert_eq!(html.matches("</script>").count(), 2);
    }
}
