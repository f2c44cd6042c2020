// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod checkpoint_store_test;
pub mod job_repository_test;
pub mod link_repository_test;
pub mod proxy_repository_test;
