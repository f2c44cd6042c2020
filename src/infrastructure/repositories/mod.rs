// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库实现模块
///
/// 基于SeaORM实现领域层定义的仓库接口
pub mod fetch_attempt_repo_impl;
pub mod hotel_repo_impl;
pub mod job_repo_impl;
pub mod link_repo_impl;
pub mod proxy_repo_impl;

pub use fetch_attempt_repo_impl::FetchAttemptRepositoryImpl;
pub use hotel_repo_impl::HotelRepositoryImpl;
pub use job_repo_impl::JobRepositoryImpl;
pub use link_repo_impl::LinkRepositoryImpl;
pub use proxy_repo_impl::ProxyRepositoryImpl;
