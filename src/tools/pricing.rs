//! Pricing skill tools.
//!
//! The `dbq_*` tools do not touch the database. They return a
//! `{"type": "sql_query", "sql": ...}` object that the model then runs
//! through the MCP `query` tool. `calculate_final_price` does the quote
//! arithmetic locally.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::agent_core::errors::AgentError;
use crate::inference::types::ToolDefinition;

use super::args::{number, optional_str, required_str};
use super::LocalTool;

// ─── SQL Templates ──────────────────────────────────────────────────────────

/// Quote a value for a single-quoted SQL literal.
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A tool that fills a SQL template from string arguments.
pub struct SqlTemplateTool {
    name: &'static str,
    description: &'static str,
    /// Argument names, in template order.
    fields: &'static [(&'static str, &'static str)],
    template: fn(&[String]) -> String,
}

impl SqlTemplateTool {
    /// Render the SQL for `arguments`.
    pub fn render(&self, arguments: &Value) -> Result<String, AgentError> {
        let literals = self
            .fields
            .iter()
            .map(|(field, _)| required_str(self.name, arguments, field).map(sql_literal))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((self.template)(&literals))
    }
}

#[async_trait]
impl LocalTool for SqlTemplateTool {
    fn definition(&self) -> ToolDefinition {
        let properties: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|(field, desc)| (field.to_string(), json!({"type": "string", "description": desc})))
            .collect();
        let required: Vec<&str> = self.fields.iter().map(|(f, _)| *f).collect();
        ToolDefinition::function(
            self.name,
            self.description,
            json!({"type": "object", "properties": properties, "required": required}),
        )
    }

    async fn call(&mut self, arguments: &Value) -> Result<String, AgentError> {
        let sql = self.render(arguments)?;
        Ok(json!({"type": "sql_query", "sql": sql}).to_string())
    }
}

const SIZE_FIELD: (&str, &str) = ("尺寸", "商品尺寸，如 \"55寸\"");
const CONFIG_FIELD: (&str, &str) = ("配置", "商品配置，如 \"单系统/Win10/i5/8+256G\"");

pub fn price_by_size_config() -> SqlTemplateTool {
    SqlTemplateTool {
        name: "dbq_price_by_size_config",
        description: "查询指定尺寸与配置的商品价格。用于直接获取某个尺寸+配置的一行报价数据。",
        fields: &[SIZE_FIELD, CONFIG_FIELD],
        template: |v| format!("SELECT * FROM 商品报价表 WHERE 尺寸 = {} AND 配置 = {}", v[0], v[1]),
    }
}

pub fn configs_by_size() -> SqlTemplateTool {
    SqlTemplateTool {
        name: "dbq_configs_by_size",
        description: "查询给定尺寸下的可用配置列表。用于快速获取该尺寸下所有配置选项。",
        fields: &[SIZE_FIELD],
        template: |v| format!("SELECT DISTINCT 配置 FROM 商品报价表 WHERE 尺寸 = {}", v[0]),
    }
}

pub fn i5_i7_price_rows() -> SqlTemplateTool {
    SqlTemplateTool {
        name: "dbq_i5_i7_price_rows",
        description: "一次性查询同一尺寸下 i5 与 i7 相关配置的价格行。用于对比 i5 与 i7 价格差。",
        fields: &[SIZE_FIELD],
        template: |v| {
            format!(
                "SELECT 配置, 尺寸, 价格, 底价 FROM 商品报价表 WHERE 尺寸 = {} AND (配置 LIKE '%i5%' OR 配置 LIKE '%i7%')",
                v[0]
            )
        },
    }
}

pub fn size_info() -> SqlTemplateTool {
    SqlTemplateTool {
        name: "dbq_size_info",
        description: "查询指定尺寸的长宽厚等尺寸信息。用于生成报价单中的尺寸字段。",
        fields: &[SIZE_FIELD],
        template: |v| format!("SELECT * FROM 尺寸表 WHERE 尺寸 = {}", v[0]),
    }
}

// ─── Final Price ────────────────────────────────────────────────────────────

/// Wall-mount discount against the default mobile cart.
const WALL_MOUNT_ADJUSTMENT: f64 = -100.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBreakdown {
    #[serde(rename = "基础价格")]
    pub base: f64,
    #[serde(rename = "升级差价")]
    pub upgrade: f64,
    #[serde(rename = "支架调整")]
    pub mount_adjustment: f64,
    #[serde(rename = "税费")]
    pub tax: f64,
    #[serde(rename = "最终价格")]
    pub final_price: f64,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Quote arithmetic: wall mount −100, then 普票 ×1.03 or 专票 ×1.10.
pub fn final_price(base: f64, upgrade: f64, mount: &str, invoice: Option<&str>) -> PriceBreakdown {
    let mount_adjustment = if mount == "壁挂" { WALL_MOUNT_ADJUSTMENT } else { 0.0 };
    let pre_tax = base + upgrade + mount_adjustment;
    let total = match invoice {
        Some("普票") => pre_tax * 1.03,
        Some("专票") => pre_tax * 1.10,
        _ => pre_tax,
    };
    PriceBreakdown {
        base,
        upgrade,
        mount_adjustment,
        tax: round2(total - pre_tax),
        final_price: round2(total),
    }
}

pub struct CalculateFinalPrice;

impl CalculateFinalPrice {
    const NAME: &'static str = "calculate_final_price";
}

#[async_trait]
impl LocalTool for CalculateFinalPrice {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            Self::NAME,
            "计算最终价格。在基础价格上加升级差价，壁挂支架减 100 元，普票加 3%，专票加 10%。",
            json!({
                "type": "object",
                "properties": {
                    "基础价格": {"type": "number", "description": "商品基础价格"},
                    "升级差价": {"type": "number", "description": "配置升级的差价，默认 0"},
                    "支架类型": {"type": "string", "enum": ["移动推车", "壁挂"], "description": "默认 移动推车"},
                    "开票类型": {"type": "string", "enum": ["普票", "专票"], "description": "不开票时省略"}
                },
                "required": ["基础价格"]
            }),
        )
    }

    async fn call(&mut self, arguments: &Value) -> Result<String, AgentError> {
        let base = number(Self::NAME, arguments, "基础价格", None)?;
        let upgrade = number(Self::NAME, arguments, "升级差价", Some(0.0))?;
        let mount = optional_str(arguments, "支架类型").unwrap_or("移动推车");
        let invoice = optional_str(arguments, "开票类型");

        let breakdown = final_price(base, upgrade, mount, invoice);
        tracing::debug!(base, upgrade, mount, invoice = ?invoice, final_price = breakdown.final_price, "price calculated");
        Ok(serde_json::to_string(&breakdown)?)
    }
}

/// Every pricing tool, ready to register.
pub fn pricing_tools() -> Vec<Box<dyn LocalTool>> {
    vec![
        Box::new(price_by_size_config()),
        Box::new(configs_by_size()),
        Box::new(i5_i7_price_rows()),
        Box::new(size_info()),
        Box::new(CalculateFinalPrice),
    ]
}

// ─── Tests ──────────────────────────────────────────────────────────────────
