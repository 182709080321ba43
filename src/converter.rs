// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Two linked amount fields kept consistent through the current rate table.
//!
//! Every write to a field, whether typed by the user or made by the
//! synchronizer itself, produces one [`FieldChange`] notification. A
//! notification on one side triggers a conversion into the other side; the
//! [`EchoGuard`] swallows the notification caused by that conversion's own
//! write so the two fields never ping-pong.

use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::models::{Currency, RateTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Upper,
    Lower,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Upper => Side::Lower,
            Side::Lower => Side::Upper,
        }
    }
}

/// Converts `amount` held on `source` into `target_currency`.
///
/// Returns 0.0 when either currency is missing from `rates` or the source rate
/// is zero.
pub fn propagate(
    source: Side,
    amount: f64,
    source_currency: &Currency,
    target_currency: &Currency,
    rates: &RateTable,
) -> f64 {
    let (Some(from), Some(to)) = (
        rates.rate(&source_currency.code),
        rates.rate(&target_currency.code),
    ) else {
        debug!(
            ?source,
            from = %source_currency.code,
            to = %target_currency.code,
            "currency missing from rate table, falling back to zero"
        );
        return 0.0;
    };

    if from == 0.0 {
        warn!(code = %source_currency.code, "zero exchange rate in rate table");
        return 0.0;
    }

    amount * to / from
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardState {
    #[default]
    Idle,
    Suppressing,
}

/// Swallows exactly one notification after a programmatic write.
#[derive(Debug, Default)]
pub struct EchoGuard {
    state: GuardState,
}

impl EchoGuard {
    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn engage(&mut self) {
        if self.state == GuardState::Suppressing {
            warn!("echo guard engaged twice without an intervening notification");
        }
        self.state = GuardState::Suppressing;
    }

    /// Returns whether a notification may run a conversion, consuming a pending suppression.
    pub fn admit(&mut self) -> bool {
        match self.state {
            GuardState::Idle => true,
            GuardState::Suppressing => {
                self.state = GuardState::Idle;
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub currency: Currency,
    pub amount: f64,
}

impl Field {
    fn empty() -> Self {
        Self {
            currency: Currency::null(),
            amount: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionPair {
    pub upper: Field,
    pub lower: Field,
}

impl ConversionPair {
    pub fn field(&self, side: Side) -> &Field {
        match side {
            Side::Upper => &self.upper,
            Side::Lower => &self.lower,
        }
    }

    fn field_mut(&mut self, side: Side) -> &mut Field {
        match side {
            Side::Upper => &mut self.upper,
            Side::Lower => &mut self.lower,
        }
    }
}

impl Default for ConversionPair {
    fn default() -> Self {
        Self {
            upper: Field::empty(),
            lower: Field::empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChange {
    Amount(Side),
    Currency(Side),
}

impl FieldChange {
    /// The side whose amount must be recomputed.
    ///
    /// A new amount moves the opposite field; a new currency re-prices its own field.
    pub fn target(self) -> Side {
        match self {
            FieldChange::Amount(side) => side.opposite(),
            FieldChange::Currency(side) => side,
        }
    }
}

#[derive(Debug, Default)]
pub struct Synchronizer {
    pair: ConversionPair,
    guard: EchoGuard,
    pending: VecDeque<FieldChange>,
    dispatching: bool,
    recomputations: u64,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pair(&self) -> &ConversionPair {
        &self.pair
    }

    pub fn guard_state(&self) -> GuardState {
        self.guard.state()
    }

    /// Number of conversions run so far.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    /// A user edit of one field's amount.
    pub fn edit_amount(&mut self, side: Side, amount: f64, rates: &RateTable) {
        self.write_amount(side, amount, rates);
    }

    /// A user (or refresh) choice of currency for one field.
    pub fn select_currency(&mut self, side: Side, currency: Currency, rates: &RateTable) {
        self.write_currency(side, currency, rates);
    }

    /// Exchanges currency and amount between the two fields without running any conversion.
    pub fn swap(&mut self, rates: &RateTable) {
        let upper = self.pair.upper.clone();
        let lower = self.pair.lower.clone();

        self.guard.engage();
        self.write_currency(Side::Upper, lower.currency, rates);
        self.guard.engage();
        self.write_amount(Side::Upper, lower.amount, rates);
        self.guard.engage();
        self.write_currency(Side::Lower, upper.currency, rates);
        self.guard.engage();
        self.write_amount(Side::Lower, upper.amount, rates);
    }

    /// Initial state: currencies are placed silently, then the lower amount is
    /// written so the upper amount is derived from it.
    pub fn restore(
        &mut self,
        upper: Currency,
        lower: Currency,
        lower_amount: f64,
        rates: &RateTable,
    ) {
        self.pair.upper.currency = upper;
        self.pair.lower.currency = lower;
        self.write_amount(Side::Lower, lower_amount, rates);
    }

    /// Re-prices the pair after a rate table replacement.
    ///
    /// The upper currency is always re-applied, which recomputes the upper
    /// amount from the lower one; the lower currency is only written when it
    /// has to change.
    pub fn apply_rates(&mut self, upper: Currency, lower: Currency, rates: &RateTable) {
        self.write_currency(Side::Upper, upper, rates);
        if lower.code != self.pair.lower.currency.code {
            self.write_currency(Side::Lower, lower, rates);
        }
    }

    fn write_amount(&mut self, side: Side, amount: f64, rates: &RateTable) {
        self.pair.field_mut(side).amount = amount;
        self.notify(FieldChange::Amount(side), rates);
    }

    fn write_currency(&mut self, side: Side, currency: Currency, rates: &RateTable) {
        self.pair.field_mut(side).currency = currency;
        self.notify(FieldChange::Currency(side), rates);
    }

    fn notify(&mut self, change: FieldChange, rates: &RateTable) {
        self.pending.push_back(change);
        if self.dispatching {
            return;
        }

        self.dispatching = true;
        while let Some(change) = self.pending.pop_front() {
            self.dispatch(change, rates);
        }
        self.dispatching = false;
    }

    fn dispatch(&mut self, change: FieldChange, rates: &RateTable) {
        if !self.guard.admit() {
            debug!(?change, "swallowed echo of programmatic write");
            return;
        }

        let target = change.target();
        let source = target.opposite();
        let from = self.pair.field(source);
        let to = self.pair.field(target);
        let converted = propagate(source, from.amount, &from.currency, &to.currency, rates);

        debug!(?change, ?target, converted, "recomputed field");
        self.recomputations += 1;
        self.guard.engage();
        self.write_amount(target, converted, rates);
    }
}
