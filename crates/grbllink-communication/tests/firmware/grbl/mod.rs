mod response_parser;
mod settings;
mod status_parser;
