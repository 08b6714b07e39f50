mod t_cleanup;
