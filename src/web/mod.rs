pub mod error;

/// Configures the web app
///
/// @see https://docs.rs/actix-web/4.0.1/actix_web/struct.App.html#method.configure
pub fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(crate::status::view_status)
        .service(crate::activity::view_feed)
        .service(crate::forum::view_forum_index)
        .service(crate::forum::view_forum)
        .service(crate::forum::create_thread)
        .service(crate::thread::view_thread)
        .service(crate::thread::create_reply)
        .service(crate::thread::update_thread)
        .service(crate::vote::vote_on_thread)
        .service(crate::vote::vote_on_reply)
        .service(crate::subscription::subscribe_thread)
        .service(crate::subscription::unsubscribe_thread)
        .service(crate::subscription::view_subscribers)
        .service(crate::follow::follow_member)
        .service(crate::follow::unfollow_member)
        .service(crate::follow::view_follows)
        .service(crate::reputation::view_leaderboard)
        .service(crate::reputation::view_reputation)
        .service(crate::challenge::view_challenges)
        .service(crate::challenge::post_progress)
        .service(crate::challenge::view_challenge_leaderboard)
        .service(crate::moderation::delete_thread)
        .service(crate::moderation::spam_thread)
        .service(crate::moderation::restore_thread)
        .service(crate::moderation::delete_reply)
        .service(crate::moderation::restore_reply)
        .service(crate::moderation::pin_thread)
        .service(crate::moderation::lock_thread)
        .service(crate::moderation::report_thread)
        .service(crate::moderation::report_reply)
        .service(crate::moderation::resolve_report)
        .service(crate::moderation::dismiss_report)
        .service(crate::moderation::purge_activity)
        .service(crate::session::view_task_expire_sessions);
}
