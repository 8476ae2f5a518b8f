#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum PlateLogQuery {
    All,
    GlobalLike(String),
    FieldExact { column: &'static str, value: String },
    FieldLike { column: &'static str, pattern: String },
}

pub(super) fn parse_plate_log_query(query: Option<&str>) -> PlateLogQuery {
    let Some(raw) = query.map(str::trim).filter(|v| !v.is_empty()) else {
        return PlateLogQuery::All;
    };

    // 中文注释：优先解析字段前缀（如 plate:/camera:），车牌走精确匹配可以命中索引；自由文本才退化为多列 LIKE。
    if let Some(parsed) = parse_prefixed_plate_log_query(raw) {
        return parsed;
    }

    PlateLogQuery::GlobalLike(format!("%{}%", raw))
}

fn parse_prefixed_plate_log_query(raw: &str) -> Option<PlateLogQuery> {
    let (prefix, value) = raw.split_once(':')?;
    let normalized_prefix = prefix.trim().to_ascii_lowercase();
    let normalized_value = value.trim();
    if normalized_value.is_empty() {
        return None;
    }

    match normalized_prefix.as_str() {
        // plates are stored upper-case
        "plate" => Some(PlateLogQuery::FieldExact {
            column: "plate",
            value: normalized_value.to_ascii_uppercase(),
        }),
        "camera" | "camera_id" => Some(PlateLogQuery::FieldExact {
            column: "camera_id",
            value: normalized_value.to_string(),
        }),
        "location" | "location_code" => Some(PlateLogQuery::FieldExact {
            column: "location_code",
            value: normalized_value.to_string(),
        }),
        "transaction" | "transaction_no" | "trx" => Some(PlateLogQuery::FieldLike {
            column: "transaction_no",
            pattern: format!("%{}%", normalized_value),
        }),
        _ => None,
    }
}
