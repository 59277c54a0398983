use domain::{ChartPoint, ChartType, ForexQuote};
use serde_json::Value;

fn tables(raw: &Value) -> &[Value] {
    raw.get("tables")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn column<'a>(table: &'a Value, name: &str) -> &'a [Value] {
    table
        .get(name)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn first_number(table: &Value, name: &str) -> f64 {
    column(table, name)
        .first()
        .and_then(as_number)
        .unwrap_or(0.0)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_time(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn format_realtime(raw: &Value) -> Vec<ForexQuote> {
    tables(raw)
        .iter()
        .map(|entry| {
            let table = entry.get("table").unwrap_or(&Value::Null);
            ForexQuote {
                code: entry
                    .get("thscode")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                latest: first_number(table, "latest"),
                change_ratio: first_number(table, "changeRatio"),
                open: first_number(table, "open"),
                high: first_number(table, "high"),
                low: first_number(table, "low"),
            }
        })
        .collect()
}

/// Flattens vendor tables into chart rows sorted by time.
pub fn format_chart(raw: &Value, chart_type: ChartType) -> Vec<ChartPoint> {
    let mut points = Vec::new();
    for entry in tables(raw) {
        let times = column(entry, "time");
        let table = entry.get("table").unwrap_or(&Value::Null);
        let non_empty = |name: &str| Some(column(table, name)).filter(|c| !c.is_empty());

        match chart_type {
            ChartType::Kline => {
                let opens = column(table, "open");
                let closes = non_empty("latest").unwrap_or_else(|| column(table, "close"));
                let lows = column(table, "low");
                let highs = column(table, "high");
                let volumes = column(table, "volume");
                for (idx, time) in times.iter().enumerate() {
                    let row = (
                        as_time(time),
                        opens.get(idx).and_then(as_number),
                        closes.get(idx).and_then(as_number),
                        lows.get(idx).and_then(as_number),
                        highs.get(idx).and_then(as_number),
                    );
                    if let (Some(time), Some(open), Some(close), Some(low), Some(high)) = row {
                        let volume = volumes.get(idx).and_then(as_number).unwrap_or(0.0);
                        points.push(ChartPoint::Candle(time, open, close, low, high, volume));
                    }
                }
            }
            ChartType::Line => {
                let prices = non_empty("latest").unwrap_or_else(|| column(table, "close"));
                for (idx, time) in times.iter().enumerate() {
                    if let (Some(time), Some(price)) = (as_time(time), prices.get(idx).and_then(as_number)) {
                        points.push(ChartPoint::Line(time, price));
                    }
                }
            }
        }
    }
    points.sort_by(|a, b| a.time().cmp(b.time()));
    points
}
