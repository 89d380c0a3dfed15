pub mod harvest_run;
