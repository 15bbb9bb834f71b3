mod http_playback;
