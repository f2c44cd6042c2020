// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::super::helpers::create_test_db;
use social_discovery::domain::models::discovered_link::{DiscoveredLink, SocialNetwork};
use social_discovery::domain::repositories::link_repository::LinkRepository;
use social_discovery::infrastructure::repositories::LinkRepositoryImpl;
use uuid::Uuid;

fn link(job_id: Uuid, url: &str, network: SocialNetwork) -> DiscoveredLink {
    DiscoveredLink::new(job_id, url.to_string(), network, "https://grand-hotel.test/".to_string())
}

#[tokio::test]
async fn test_links_upsert_and_go_stale() {
    let (_dir, db) = create_test_db().await;
    let repo = LinkRepositoryImpl::new(db);
    let job_id = Uuid::new_v4();
    let source = "https://grand-hotel.test/";

    repo.upsert_links(&[
        link(job_id, "https://www.facebook.com/GrandHotel", SocialNetwork::Facebook),
        link(job_id, "https://instagram.com/grandhotel", SocialNetwork::Instagram),
    ])
    .await
    .unwrap();

    // 第二次抓取只剩 Facebook
    let present = vec!["https://www.facebook.com/GrandHotel".to_string()];
    repo.upsert_links(&[link(job_id, &present[0], SocialNetwork::Facebook)])
        .await
        .unwrap();
    assert_eq!(repo.deactivate_missing(job_id, source, &present).await.unwrap(), 1);
    assert_eq!(repo.deactivate_missing(job_id, source, &present).await.unwrap(), 0);

    let links = repo.list_by_job(job_id).await.unwrap();
    assert_eq!(links.len(), 2);
    let facebook = links.iter().find(|l| l.network == SocialNetwork::Facebook).unwrap();
    let instagram = links.iter().find(|l| l.network == SocialNetwork::Instagram).unwrap();
    assert!(facebook.is_active);
    assert!(!instagram.is_active);

    // 再次出现后重新激活
    repo.upsert_links(&[link(job_id, "https://instagram.com/grandhotel", SocialNetwork::Instagram)])
        .await
        .unwrap();
    assert!(repo
        .list_by_job(job_id)
        .await
        .unwrap()
        .iter()
        .all(|l| l.is_active));

    // 页面上已没有任何链接
    assert_eq!(repo.deactivate_missing(job_id, source, &[]).await.unwrap(), 2);
}
