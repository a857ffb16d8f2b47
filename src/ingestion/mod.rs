pub mod fill_stream;
