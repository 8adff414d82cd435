//! The validated, immutable tables every query reads from.

use crate::domain::{
    ActionKind, ActionLog, FundSourceRecord, HoldingsRecord, ProtocolInteractionRecord,
    RawActionRow, RawFundSourceRow, RawHoldingsRow, RawProtocolInteractionRow,
};
use crate::engine::{FundSourceTable, HoldingsTable, ProtocolTable};
use crate::error::DataIntegrityError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Unvalidated rows for all four tables, as fetched or as persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSnapshot {
    pub actions: Vec<RawActionRow>,
    pub holdings: Vec<RawHoldingsRow>,
    pub fund_sources: Vec<RawFundSourceRow>,
    pub protocol_interactions: Vec<RawProtocolInteractionRow>,
}

/// One complete refresh worth of validated data.
#[derive(Debug)]
pub struct Dataset {
    pub actions: ActionLog,
    pub holdings: Vec<HoldingsRecord>,
    pub fund_sources: Vec<FundSourceRecord>,
    pub protocol_interactions: Vec<ProtocolInteractionRecord>,
    pub holdings_table: HoldingsTable,
    pub fund_source_table: FundSourceTable,
    pub protocol_table: ProtocolTable,
    pub refreshed_at: DateTime<Utc>,
}

impl Dataset {
    /// Validate every table. A single malformed row in any table rejects the
    /// whole snapshot.
    pub fn from_raw(
        raw: &RawSnapshot,
        refreshed_at: DateTime<Utc>,
    ) -> Result<Self, DataIntegrityError> {
        let actions = ActionLog::from_raw(&raw.actions)?;
        let holdings = raw
            .holdings
            .iter()
            .map(HoldingsRecord::try_from_raw)
            .collect::<Result<Vec<_>, _>>()?;
        let fund_sources = raw
            .fund_sources
            .iter()
            .map(FundSourceRecord::try_from_raw)
            .collect::<Result<Vec<_>, _>>()?;
        let protocol_interactions = raw
            .protocol_interactions
            .iter()
            .map(ProtocolInteractionRecord::try_from_raw)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            holdings_table: HoldingsTable::new(&holdings),
            fund_source_table: FundSourceTable::new(&fund_sources),
            protocol_table: ProtocolTable::new(&protocol_interactions),
            actions,
            holdings,
            fund_sources,
            protocol_interactions,
            refreshed_at,
        })
    }

    /// The dataset served before the first successful load.
    pub fn empty() -> Self {
        Self {
            actions: ActionLog::empty(),
            holdings: Vec::new(),
            fund_sources: Vec::new(),
            protocol_interactions: Vec::new(),
            holdings_table: HoldingsTable::default(),
            fund_source_table: FundSourceTable::default(),
            protocol_table: ProtocolTable::default(),
            refreshed_at: DateTime::<Utc>::default(),
        }
    }

    /// Back to raw rows, in canonical text form, for persistence.
    pub fn to_raw(&self) -> RawSnapshot {
        RawSnapshot {
            actions: self.actions.records().iter().map(|r| r.to_raw()).collect(),
            holdings: self.holdings.iter().map(|r| r.to_raw()).collect(),
            fund_sources: self.fund_sources.iter().map(|r| r.to_raw()).collect(),
            protocol_interactions: self
                .protocol_interactions
                .iter()
                .map(|r| r.to_raw())
                .collect(),
        }
    }

    /// Action names outside the known vocabulary among successful records,
    /// with occurrence counts.
    pub fn unknown_actions(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in self.actions.records().iter().filter(|r| r.succeeded) {
            if let ActionKind::Other(name) = &record.action {
                *counts.entry(name.clone()).or_insert(0) += 1;
            }
        }
        counts
    }
}
