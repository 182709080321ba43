// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

pub mod api;
pub mod config;
pub mod converter;
pub mod db;
pub mod exchange_rates;
pub mod logging;
pub mod models;
pub mod refresh;
pub mod screen;
pub mod session;
pub mod settings;
