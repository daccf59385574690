use regex::Regex;
use std::collections::BTreeMap;

/// Strength of a case-insensitive full match.
const FULL_MATCH: f64 = 1.0;
/// Strength of a case-insensitive substring containment.
const SUBSTRING_MATCH: f64 = 0.8;

/// Built-in bilingual category dictionary.
const BUILTIN_DICTIONARY: &[(&str, &[&str])] = &[
    ("person", &["name", "employee", "customer", "staff", "manager", "姓名", "员工", "客户", "负责人"]),
    ("time", &["date", "time", "year", "month", "day", "quarter", "period", "日期", "时间", "年份", "月份", "季度"]),
    ("financial", &["amount", "price", "cost", "revenue", "sales", "income", "profit", "finance", "budget", "金额", "价格", "收入", "销售", "利润", "成本"]),
    ("quantity", &["qty", "quantity", "count", "total", "volume", "数量", "合计", "总计"]),
    ("location", &["city", "country", "region", "address", "province", "location", "城市", "地区", "地址", "省份"]),
    ("identifier", &["id", "code", "sku", "serial", "编号", "代码"]),
    ("product", &["product", "item", "goods", "category", "model", "产品", "商品", "品类"]),
    ("status", &["status", "state", "flag", "type", "状态", "类型"]),
    ("contact", &["phone", "email", "mobile", "tel", "电话", "邮箱", "手机"]),
];

struct SemanticPattern {
    full: Regex,
    lowercase: String,
}

/// Scores free text against category dictionaries.
///
/// A case-insensitive full match of any pattern scores 1.0, containment of the
/// pattern text scores 0.8; categories that do not match are omitted.
pub struct SemanticPatternMatcher {
    categories: BTreeMap<String, Vec<SemanticPattern>>,
}

impl SemanticPatternMatcher {
    pub fn new(dictionary: &BTreeMap<String, Vec<String>>) -> Result<SemanticPatternMatcher, regex::Error> {
        let mut categories = BTreeMap::new();
        for (category, patterns) in dictionary {
            let compiled = patterns
                .iter()
                .map(|pattern| {
                    Ok(SemanticPattern {
                        full: Regex::new(&format!("(?i)^(?:{pattern})$"))?,
                        lowercase: pattern.to_lowercase(),
                    })
                })
                .collect::<Result<Vec<_>, regex::Error>>()?;
            categories.insert(category.to_owned(), compiled);
        }
        Ok(SemanticPatternMatcher { categories })
    }

    /// Category -> strength for every category matching `text`.
    pub fn score(&self, text: &str) -> BTreeMap<String, f64> {
        let text = text.trim();
        let mut scores = BTreeMap::new();
        if text.is_empty() {
            return scores;
        }
        let lowercase = text.to_lowercase();
        for (category, patterns) in &self.categories {
            let strength = patterns
                .iter()
                .map(|pattern| {
                    if pattern.full.is_match(text) {
                        FULL_MATCH
                    } else if !pattern.lowercase.is_empty() && lowercase.contains(&pattern.lowercase) {
                        SUBSTRING_MATCH
                    } else {
                        0.0
                    }
                })
                .fold(0.0, f64::max);
            if strength > 0.0 {
                scores.insert(category.to_owned(), strength);
            }
        }
        scores
    }
}

/// The built-in dictionary as an owned map, e.g. as a starting point for a custom one.
pub fn builtin_dictionary() -> BTreeMap<String, Vec<String>> {
    BUILTIN_DICTIONARY
        .iter()
        .map(|(category, patterns)| {
            (category.to_string(), patterns.iter().map(|pattern| pattern.to_string()).collect())
        })
        .collect()
}

impl Default for SemanticPatternMatcher {
    fn default() -> Self {
        SemanticPatternMatcher::new(&builtin_dictionary()).expect("Hardcode regex pattern")
    }
}
