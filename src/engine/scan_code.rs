// ==========================================
// 纺织生产追溯系统 - 布号 / 扫码串编解码
// ==========================================
// 布号:   {经轴号}-{匹号:02}            W5-03
// 子匹号: {父布号}/{子序号:02}          W5-03/01
// 扫码串: {经轴号}/{匹号:02}[/{子序号:02}]
// 解码容错: 连接符 '-' 与 '/' 等价，数字补零与否等价
// ==========================================

use crate::engine::error::{RuleResult, RuleViolation};

pub fn fabric_number(warp_code: &str, cut_number: i64) -> String {
    format!("{}-{:02}", warp_code, cut_number)
}

pub fn scan_code(warp_code: &str, cut_number: i64) -> String {
    format!("{}/{:02}", warp_code, cut_number)
}

pub fn sub_fabric_number(parent_fabric_number: &str, sub_cut_number: i64) -> String {
    format!("{}/{:02}", parent_fabric_number, sub_cut_number)
}

pub fn sub_scan_code(warp_code: &str, cut_number: i64, sub_cut_number: i64) -> String {
    format!("{}/{:02}/{:02}", warp_code, cut_number, sub_cut_number)
}

// ==========================================
// DecodedScan - 解码结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedScan {
    pub warp_code: String,
    pub cut_number: i64,
    pub sub_cut_number: Option<i64>,
}

impl DecodedScan {
    /// 展开为全部等价布号写法（去重，保持顺序）
    ///
    /// 普通匹 4 种，子匹 8 种
    pub fn candidates(&self) -> Vec<String> {
        let cuts = number_spellings(self.cut_number);
        let mut out: Vec<String> = Vec::new();

        for joiner in ['-', '/'] {
            for cut in &cuts {
                let base = format!("{}{}{}", self.warp_code, joiner, cut);
                match self.sub_cut_number {
                    None => push_unique(&mut out, base),
                    Some(sub) => {
                        for sub in number_spellings(sub) {
                            push_unique(&mut out, format!("{}/{}", base, sub));
                        }
                    }
                }
            }
        }
        out
    }
}

fn number_spellings(n: i64) -> [String; 2] {
    [format!("{:02}", n), n.to_string()]
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !out.contains(&value) {
        out.push(value);
    }
}

fn parse_number(raw: &str, what: &str, scanned: &str) -> RuleResult<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(RuleViolation::Validation(format!(
            "扫码串{}不是数字: {}",
            what, scanned
        )));
    }
    let value: i64 = trimmed.parse().map_err(|_| {
        RuleViolation::Validation(format!("扫码串{}超出范围: {}", what, scanned))
    })?;
    if value <= 0 {
        return Err(RuleViolation::Validation(format!(
            "扫码串{}必须大于 0: {}",
            what, scanned
        )));
    }
    Ok(value)
}

/// 解码扫码串
///
/// 接受 `W2/01`、`W2-01`、`W2/1`、`W2-1`，以及子匹 `W5/03/01`、`W5-03/01` 等写法。
/// 经轴号本身不含 '-'，首段若含 '-' 则在最后一个 '-' 处拆出匹号。
pub fn decode(scanned: &str) -> RuleResult<DecodedScan> {
    let raw = scanned.trim();
    if raw.is_empty() {
        return Err(RuleViolation::Validation("扫码串为空".to_string()));
    }

    let mut segments = raw.split('/');
    let head = segments.next().unwrap_or_default();
    let mut parts: Vec<&str> = match head.rsplit_once('-') {
        Some((warp, cut)) => vec![warp, cut],
        None => vec![head],
    };
    parts.extend(segments);

    let (warp_code, cut_raw, sub_raw) = match parts.as_slice() {
        [warp, cut] => (*warp, *cut, None),
        [warp, cut, sub] => (*warp, *cut, Some(*sub)),
        _ => {
            return Err(RuleViolation::Validation(format!(
                "无法识别的扫码串: {}",
                scanned
            )))
        }
    };

    let warp_code = warp_code.trim();
    if warp_code.is_empty() {
        return Err(RuleViolation::Validation(format!(
            "扫码串缺少经轴号: {}",
            scanned
        )));
    }

    Ok(DecodedScan {
        warp_code: warp_code.to_string(),
        cut_number: parse_number(cut_raw, "匹号", scanned)?,
        sub_cut_number: sub_raw
            .map(|s| parse_number(s, "子序号", scanned))
            .transpose()?,
    })
}
