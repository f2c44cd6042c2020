// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod application;

pub mod config;

pub mod domain;

pub mod engines;

pub mod infrastructure;

pub mod queue;

pub mod utils;

pub mod workers;
