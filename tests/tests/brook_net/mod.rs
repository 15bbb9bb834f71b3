mod http_client;
mod http_feed;
