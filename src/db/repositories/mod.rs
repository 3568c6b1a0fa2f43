mod activities;
