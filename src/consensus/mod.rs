pub mod forging_loop;
