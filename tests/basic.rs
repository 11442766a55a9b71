#[cfg(test)]
mod tests {
    use actix_web::{test, App};

    #[actix_rt::test]
    async fn test_status_get() {
        vatra::status::init();
        let mut app = test::init_service(App::new().service(vatra::status::view_status)).await;
        let req = test::TestRequest::default().uri("/status").to_request();
        let resp = test::call_service(&mut app, req).await;
        assert!(resp.status().is_success());
    }
}
