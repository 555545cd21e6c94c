pub mod property_query;
