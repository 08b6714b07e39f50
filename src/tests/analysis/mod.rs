mod t_reads_and_writes;
mod t_use_before_init;
