pub mod activity_events;
pub mod challenge_progress;
pub mod challenges;
pub mod forum_categories;
pub mod forum_posts;
pub mod forum_replies;
pub mod forum_reports;
pub mod forum_subscriptions;
pub mod forum_votes;
pub mod sessions;
pub mod user_badges;
pub mod user_follows;
pub mod user_reputation;
pub mod users;
