// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::super::helpers::create_test_db;
use social_discovery::domain::models::proxy::ProxyHealth;
use social_discovery::domain::repositories::proxy_repository::ProxyRepository;
use social_discovery::engines::proxy_manager::{ProxyManager, ProxyPolicy, ProxyReport};
use social_discovery::infrastructure::repositories::ProxyRepositoryImpl;

#[tokio::test]
async fn test_proxy_health_survives_restart() {
    let (_dir, db) = create_test_db().await;
    let repo = ProxyRepositoryImpl::new(db);
    let endpoints = vec![
        "http://p1.proxy.test:8080".to_string(),
        "http://p2.proxy.test:8080".to_string(),
    ];
    assert_eq!(repo.insert_endpoints(&endpoints).await.unwrap(), 2);
    assert_eq!(repo.insert_endpoints(&endpoints).await.unwrap(), 0);

    let manager = ProxyManager::from_snapshot(repo.list_all().await.unwrap(), ProxyPolicy::default());
    manager.report("http://p1.proxy.test:8080", ProxyReport::Fatal);
    repo.save_states(&manager.snapshot()).await.unwrap();

    // 重新导入不会覆盖已有的健康状态
    repo.insert_endpoints(&endpoints).await.unwrap();

    let stored = repo.list_all().await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].endpoint, "http://p1.proxy.test:8080");
    assert_eq!(stored[0].health, ProxyHealth::Quarantined);
    assert!(stored[0].quarantined_until.is_some());
    assert_eq!(stored[1].health, ProxyHealth::Healthy);

    let restored = ProxyManager::from_snapshot(stored, ProxyPolicy::default());
    assert_eq!(
        restored.health("http://p1.proxy.test:8080"),
        Some(ProxyHealth::Quarantined)
    );
    assert_eq!(restored.select().as_deref(), Some("http://p2.proxy.test:8080"));
}
