//! 出口中繼營運者的資助分配
//!
//! 每個中繼的資助 = 月預算 × (該中繼出口頻寬 / 全體頻寬) × 所在國家因子，
//! 合作夥伴的資助為旗下中繼資助總和，並以每月上限封頂。

use crate::utils::error::{FactorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_MAX_MONTHLY_SUPPORT: f64 = 500.0;

/// 共識文件中單一中繼的狀態項目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub fingerprint: String,
    pub published: DateTime<Utc>,
    pub allows_exit: bool,
    #[serde(default)]
    pub unmeasured: bool,
    pub bandwidth: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Recorded,
    SkippedNotExit,
    SkippedUnmeasured,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relay {
    pub nickname: String,
    pub fingerprint: String,
    pub country: String,
    #[serde(default)]
    pub status_entries_seen: u64,
    #[serde(default)]
    pub total_reported_bandwidth: u64,
    #[serde(skip_deserializing)]
    pub support: Option<f64>,
}

impl Relay {
    pub fn new(
        nickname: impl Into<String>,
        fingerprint: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            nickname: nickname.into(),
            fingerprint: fingerprint.into(),
            country: country.into().to_ascii_lowercase(),
            status_entries_seen: 0,
            total_reported_bandwidth: 0,
            support: None,
        }
    }

    /// 只累計允許出口且頻寬已量測的項目，其餘僅計數
    pub fn record_status_entry(&mut self, entry: &StatusEntry) -> Result<EntryOutcome> {
        if entry.fingerprint != self.fingerprint {
            return Err(FactorError::invalid_input(format!(
                "status entry for {} recorded against relay {}",
                entry.fingerprint, self.fingerprint
            )));
        }

        self.status_entries_seen += 1;

        if !entry.allows_exit {
            tracing::debug!("skip {} on {}: not an exit", entry.fingerprint, entry.published);
            return Ok(EntryOutcome::SkippedNotExit);
        }
        if entry.unmeasured {
            tracing::debug!(
                "skip {} on {}: unmeasured bandwidth",
                entry.fingerprint,
                entry.published
            );
            return Ok(EntryOutcome::SkippedUnmeasured);
        }

        tracing::debug!("record {} on {}", entry.fingerprint, entry.published);
        self.total_reported_bandwidth += entry.bandwidth;
        Ok(EntryOutcome::Recorded)
    }

    /// 以 Mbit/s 表示的累計出口頻寬 (頻寬單位為 bytes)
    pub fn exit_bandwidth_mbits(&self) -> f64 {
        self.total_reported_bandwidth as f64 * 8.0 / 1_000_000.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partner {
    pub name: String,
    #[serde(default)]
    pub contacts: Vec<String>,
    #[serde(default)]
    pub relays: Vec<Relay>,
    #[serde(skip_deserializing)]
    pub total_bandwidth: Option<u64>,
    #[serde(skip_deserializing)]
    pub support: Option<f64>,
}

impl Partner {
    pub fn new(name: impl Into<String>, contacts: Vec<String>) -> Self {
        Self {
            name: name.into(),
            contacts,
            relays: Vec::new(),
            total_bandwidth: None,
            support: None,
        }
    }

    fn reset(&mut self) {
        self.total_bandwidth = None;
        self.support = None;
        for relay in &mut self.relays {
            relay.support = None;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FundingParams {
    pub monthly_amount: f64,
    pub max_monthly_support: f64,
}

impl FundingParams {
    pub fn new(monthly_amount: f64) -> Self {
        Self {
            monthly_amount,
            max_monthly_support: DEFAULT_MAX_MONTHLY_SUPPORT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FundingReport {
    pub grand_total_bandwidth: u64,
    pub total_support: f64,
    /// 依資助金額遞減排序，中繼亦同
    pub partners: Vec<Partner>,
}

/// 依頻寬占比與國家因子計算資助；衍生欄位每次都從頭重算
pub fn allocate_support(
    mut partners: Vec<Partner>,
    factors: &HashMap<String, f64>,
    params: FundingParams,
) -> Result<FundingReport> {
    if !params.monthly_amount.is_finite() || params.monthly_amount < 0.0 {
        return Err(FactorError::invalid_input(format!(
            "monthly amount must be a non-negative number, got {}",
            params.monthly_amount
        )));
    }
    if !params.max_monthly_support.is_finite() || params.max_monthly_support < 0.0 {
        return Err(FactorError::invalid_input(format!(
            "monthly support cap must be a non-negative number, got {}",
            params.max_monthly_support
        )));
    }

    let mut grand_total: u64 = 0;
    for partner in &mut partners {
        partner.reset();
        let total: u64 = partner
            .relays
            .iter()
            .map(|r| r.total_reported_bandwidth)
            .sum();
        partner.total_bandwidth = Some(total);
        grand_total += total;
    }

    if grand_total == 0 {
        return Err(FactorError::division_by_zero(
            "no exit bandwidth was recorded for any partner relay",
        ));
    }

    for partner in &mut partners {
        let mut support = 0.0;
        for relay in &mut partner.relays {
            let factor = factors
                .get(&relay.country.to_ascii_lowercase())
                .copied()
                .ok_or_else(|| FactorError::MissingFactor {
                    country: relay.country.clone(),
                })?;
            let share = relay.total_reported_bandwidth as f64 / grand_total as f64;
            let relay_support = params.monthly_amount * share * factor;
            relay.support = Some(relay_support);
            support += relay_support;
        }

        if support > params.max_monthly_support {
            tracing::info!(
                "Capping support for {} from {:.2} to {:.2}",
                partner.name,
                support,
                params.max_monthly_support
            );
        }
        partner.support = Some(support.min(params.max_monthly_support));
        partner
            .relays
            .sort_by(|a, b| b.support.unwrap_or(0.0).total_cmp(&a.support.unwrap_or(0.0)));
    }

    partners.sort_by(|a, b| b.support.unwrap_or(0.0).total_cmp(&a.support.unwrap_or(0.0)));
    let total_support = partners.iter().filter_map(|p| p.support).sum();

    Ok(FundingReport {
        grand_total_bandwidth: grand_total,
        total_support,
        partners,
    })
}

/// 合作夥伴與其中繼的帳冊，可附帶共識狀態項目
#[derive(Debug, Clone, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub partners: Vec<Partner>,
    #[serde(default)]
    pub status_entries: Vec<StatusEntry>,
}

impl Ledger {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| FactorError::ConfigValidationError {
            field: "ledger".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 把狀態項目記到對應指紋的中繼上；不屬於任何合作夥伴的項目略過
    pub fn into_partners(self) -> Result<Vec<Partner>> {
        let Ledger {
            mut partners,
            status_entries,
        } = self;

        let mut index: HashMap<String, (usize, usize)> = HashMap::new();
        for (p, partner) in partners.iter_mut().enumerate() {
            for (r, relay) in partner.relays.iter_mut().enumerate() {
                relay.country = relay.country.to_ascii_lowercase();
                if index.insert(relay.fingerprint.clone(), (p, r)).is_some() {
                    return Err(FactorError::invalid_input(format!(
                        "relay {} is listed more than once",
                        relay.fingerprint
                    )));
                }
            }
        }

        let mut skipped = 0usize;
        for entry in &status_entries {
            match index.get(&entry.fingerprint) {
                Some(&(p, r)) => {
                    partners[p].relays[r].record_status_entry(entry)?;
                }
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::debug!("{} status entries did not match a partner relay", skipped);
        }

        Ok(partners)
    }
}

/// 讀取國家因子：`factors.json` 報表或扁平的 `{cc: factor}` 物件皆可
pub fn load_factors(bytes: &[u8]) -> Result<HashMap<String, f64>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FactorsDocument {
        Report { factors: Vec<crate::domain::model::CountryFactor> },
        Flat(HashMap<String, f64>),
    }

    let factors: HashMap<String, f64> = match serde_json::from_slice::<FactorsDocument>(bytes)? {
        FactorsDocument::Report { factors } => factors
            .into_iter()
            .map(|f| (f.country_code.to_ascii_lowercase(), f.factor))
            .collect(),
        FactorsDocument::Flat(map) => map
            .into_iter()
            .map(|(cc, factor)| (cc.to_ascii_lowercase(), factor))
            .collect(),
    };

    if let Some((cc, factor)) = factors.iter().find(|(_, f)| !(f.is_finite() && **f > 0.0)) {
        return Err(FactorError::invalid_input(format!(
            "factor for '{}' must be a positive number, got {}",
            cc, factor
        )));
    }

    Ok(factors)
}
