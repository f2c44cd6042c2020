// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod fetch_pipeline;
pub mod proxy_manager;
pub mod render_engine;
pub mod reqwest_engine;
pub mod traits;
